//! All SmartDash protocol message types.
//!
//! Every message on the wire is one *envelope*: a JSON object with a numeric
//! `code`, an optional virtual `pin`, and an optional scalar `value`.  Two
//! extension keys ride along when needed: `property` (property get/set) and
//! `id` (request/response correlation for reads).

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Message codes ─────────────────────────────────────────────────────────────

/// Numeric message codes carried in the `code` key of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum MessageCode {
    ReadPin = 0,
    WritePin = 1,
    GetProperty = 2,
    SetProperty = 3,
    Trigger = 4,
    SendSms = 5,
    SendEmail = 6,
    TriggerSwitch = 7,
    Error = 8,
}

impl TryFrom<u8> for MessageCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(MessageCode::ReadPin),
            1 => Ok(MessageCode::WritePin),
            2 => Ok(MessageCode::GetProperty),
            3 => Ok(MessageCode::SetProperty),
            4 => Ok(MessageCode::Trigger),
            5 => Ok(MessageCode::SendSms),
            6 => Ok(MessageCode::SendEmail),
            7 => Ok(MessageCode::TriggerSwitch),
            8 => Ok(MessageCode::Error),
            other => Err(other),
        }
    }
}

impl From<MessageCode> for u8 {
    fn from(code: MessageCode) -> u8 {
        code as u8
    }
}

impl MessageCode {
    /// Returns `true` for codes whose inbound form answers an outbound request.
    pub fn is_response(self) -> bool {
        matches!(self, MessageCode::ReadPin | MessageCode::GetProperty)
    }
}

// ── Pin values ────────────────────────────────────────────────────────────────

/// A scalar value carried by an envelope.
///
/// Serialized *untagged*: `7`, `7.5`, `"on"`, and `true` on the wire map to
/// `Int`, `Float`, `Text`, and `Bool` respectively.  Variant order matters for
/// untagged deserialization, so integers are tried before floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PinValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Default for PinValue {
    /// The value handed to handlers when an envelope has no `value` key.
    fn default() -> Self {
        PinValue::Text(String::new())
    }
}

impl PinValue {
    /// Returns the value as an integer if it is numeric or a numeric string.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PinValue::Int(v) => Some(*v),
            PinValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            PinValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns the value as a float if it is numeric or a numeric string.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PinValue::Int(v) => Some(*v as f64),
            PinValue::Float(v) => Some(*v),
            PinValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interprets the value as a switch position.
    ///
    /// Numbers are "on" when non-zero; strings accept `"1"`, `"true"`, `"on"`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PinValue::Bool(b) => Some(*b),
            PinValue::Int(v) => Some(*v != 0),
            PinValue::Float(v) => Some(*v != 0.0),
            PinValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => Some(true),
                "0" | "false" | "off" => Some(false),
                _ => None,
            },
        }
    }

    /// Returns the string payload for `Text` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PinValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinValue::Bool(b) => write!(f, "{b}"),
            PinValue::Int(v) => write!(f, "{v}"),
            PinValue::Float(v) => write!(f, "{v}"),
            PinValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for PinValue {
    fn from(v: bool) -> Self {
        PinValue::Bool(v)
    }
}

impl From<i64> for PinValue {
    fn from(v: i64) -> Self {
        PinValue::Int(v)
    }
}

impl From<i32> for PinValue {
    fn from(v: i32) -> Self {
        PinValue::Int(i64::from(v))
    }
}

impl From<u32> for PinValue {
    fn from(v: u32) -> Self {
        PinValue::Int(i64::from(v))
    }
}

impl From<f64> for PinValue {
    fn from(v: f64) -> Self {
        PinValue::Float(v)
    }
}

impl From<&str> for PinValue {
    fn from(v: &str) -> Self {
        PinValue::Text(v.to_string())
    }
}

impl From<String> for PinValue {
    fn from(v: String) -> Self {
        PinValue::Text(v)
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// One protocol message.
///
/// Absent optional keys are omitted on the wire, so a write looks like
/// `{"code":1,"pin":"V1","value":7}` and nothing more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// What the message means.
    pub code: MessageCode,
    /// Virtual pin the message is addressed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    /// Scalar payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<PinValue>,
    /// Property name for [`MessageCode::GetProperty`] / [`MessageCode::SetProperty`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// Request id; echoed by the server on responses to correlated requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl Envelope {
    /// Creates a bare envelope with only a code.
    pub fn new(code: MessageCode) -> Self {
        Self {
            code,
            pin: None,
            value: None,
            property: None,
            id: None,
        }
    }

    /// `WRITE_PIN (1)`: pushes `value` to `pin`.
    pub fn write_pin(pin: impl Into<String>, value: impl Into<PinValue>) -> Self {
        Self::new(MessageCode::WritePin)
            .with_pin(pin)
            .with_value(value)
    }

    /// `READ_PIN (0)`: asks the server for the current value of `pin`.
    pub fn read_pin(pin: impl Into<String>, id: u64) -> Self {
        Self::new(MessageCode::ReadPin).with_pin(pin).with_id(id)
    }

    /// `TRIGGER (4)`: fires or releases a trigger pin.
    pub fn trigger(pin: impl Into<String>, on: bool) -> Self {
        Self::new(MessageCode::Trigger).with_pin(pin).with_value(on)
    }

    /// `TRIGGER_SWITCH (7)`: flips a dashboard switch bound to a trigger.
    pub fn trigger_switch(pin: impl Into<String>, on: bool) -> Self {
        Self::new(MessageCode::TriggerSwitch)
            .with_pin(pin)
            .with_value(on)
    }

    /// `GET_PROPERTY (2)`: asks for a widget property of `pin`.
    pub fn get_property(pin: impl Into<String>, property: impl Into<String>, id: u64) -> Self {
        Self::new(MessageCode::GetProperty)
            .with_pin(pin)
            .with_property(property)
            .with_id(id)
    }

    /// `SET_PROPERTY (3)`: sets a widget property of `pin`.
    pub fn set_property(
        pin: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<PinValue>,
    ) -> Self {
        Self::new(MessageCode::SetProperty)
            .with_pin(pin)
            .with_property(property)
            .with_value(value)
    }

    /// `SEND_SMS (5)`: asks the server to relay a text message.
    pub fn send_sms(text: impl Into<String>) -> Self {
        Self::new(MessageCode::SendSms).with_value(PinValue::Text(text.into()))
    }

    /// `SEND_EMAIL (6)`: asks the server to relay an e-mail notification.
    pub fn send_email(text: impl Into<String>) -> Self {
        Self::new(MessageCode::SendEmail).with_value(PinValue::Text(text.into()))
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<PinValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns the value, or the empty default when the key was absent.
    pub fn value_or_default(&self) -> PinValue {
        self.value.clone().unwrap_or_default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
