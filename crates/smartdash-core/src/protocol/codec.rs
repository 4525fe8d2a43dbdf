//! JSON codec for encoding and decoding SmartDash protocol frames.
//!
//! Wire format: one WebSocket text frame carries either a single envelope
//!
//! ```text
//! {"code":1,"pin":"V1","value":7}
//! ```
//!
//! or a batch of envelopes as a JSON array:
//!
//! ```text
//! [{"code":1,"pin":"V1","value":7},{"code":1,"pin":"V2","value":"on"}]
//! ```
//!
//! Decoding happens in two stages so that failures stay distinguishable:
//! the frame is first parsed as generic JSON (syntax errors, wrong top-level
//! shape), then each element is checked for a known `code` before its
//! remaining fields are read.  An element with an unknown code is a *valid*
//! message the client does not understand, which callers may want to treat
//! differently from garbage.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::messages::{Envelope, MessageCode};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The frame is not syntactically valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The frame (or a batch element) is valid JSON but not an object.
    #[error("expected an envelope object, found {0}")]
    NotAnEnvelope(&'static str),

    /// The envelope has no `code` key.
    #[error("envelope is missing the `code` key")]
    MissingCode,

    /// The `code` key holds a number that is not a known message code.
    #[error("unknown message code: {0}")]
    UnknownCode(u64),

    /// A key holds a value of the wrong type (e.g. a numeric `pin`).
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The envelope could not be serialized.
    #[error("failed to serialize envelope: {0}")]
    Serialize(String),
}

impl ProtocolError {
    /// Returns `true` when the input was not a well-formed envelope at all,
    /// as opposed to a well-formed envelope with a code this client does not
    /// know.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, ProtocolError::UnknownCode(_))
    }
}

/// The result of decoding one inbound frame.
#[derive(Debug, PartialEq)]
pub enum DecodedFrame {
    /// The frame was a single JSON object.
    Single(Envelope),
    /// The frame was a JSON array.  Each element decodes independently so one
    /// bad element does not discard its neighbours.
    Batch(Vec<Result<Envelope, ProtocolError>>),
}

impl DecodedFrame {
    /// Flattens the frame into per-envelope results, preserving wire order.
    pub fn into_items(self) -> Vec<Result<Envelope, ProtocolError>> {
        match self {
            DecodedFrame::Single(env) => vec![Ok(env)],
            DecodedFrame::Batch(items) => items,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an [`Envelope`] into compact JSON text.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialize`] if serialization fails (a non-finite
/// float value is the only practical cause).
///
/// # Examples
///
/// ```rust
/// use smartdash_core::protocol::{encode_envelope, Envelope};
///
/// let text = encode_envelope(&Envelope::write_pin("V1", 7)).unwrap();
/// assert_eq!(text, r#"{"code":1,"pin":"V1","value":7}"#);
/// ```
pub fn encode_envelope(envelope: &Envelope) -> Result<String, ProtocolError> {
    if let Some(crate::protocol::messages::PinValue::Float(v)) = &envelope.value {
        if !v.is_finite() {
            return Err(ProtocolError::Serialize(format!(
                "value {v} cannot be represented in JSON"
            )));
        }
    }
    serde_json::to_string(envelope).map_err(|e| ProtocolError::Serialize(e.to_string()))
}

/// Encodes several envelopes as a single batch frame (a JSON array).
///
/// # Errors
///
/// Returns the first serialization error encountered.
pub fn encode_batch(envelopes: &[Envelope]) -> Result<String, ProtocolError> {
    let parts = envelopes
        .iter()
        .map(encode_envelope)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("[{}]", parts.join(",")))
}

/// Decodes one inbound text frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is not JSON, is neither an object
/// nor an array, or (for a single-object frame) is not a valid envelope.
/// Batch elements report their errors inside [`DecodedFrame::Batch`].
///
/// # Examples
///
/// ```rust
/// use smartdash_core::protocol::{decode_frame, DecodedFrame, MessageCode};
///
/// let frame = decode_frame(r#"{"code":8,"value":"bad pin"}"#).unwrap();
/// let DecodedFrame::Single(env) = frame else { panic!("expected one envelope") };
/// assert_eq!(env.code, MessageCode::Error);
/// ```
pub fn decode_frame(text: &str) -> Result<DecodedFrame, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    match value {
        Value::Array(elements) => Ok(DecodedFrame::Batch(
            elements.into_iter().map(decode_envelope).collect(),
        )),
        Value::Object(_) => decode_envelope(value).map(DecodedFrame::Single),
        other => Err(ProtocolError::NotAnEnvelope(json_type_name(&other))),
    }
}

/// Decodes a single envelope from an already-parsed JSON value.
///
/// # Errors
///
/// See [`ProtocolError`] for the distinct failure cases.
pub fn decode_envelope(value: Value) -> Result<Envelope, ProtocolError> {
    let object = match value {
        Value::Object(object) => object,
        other => return Err(ProtocolError::NotAnEnvelope(json_type_name(&other))),
    };

    check_code(&object)?;

    serde_json::from_value(Value::Object(object))
        .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn check_code(object: &Map<String, Value>) -> Result<MessageCode, ProtocolError> {
    let raw = object.get("code").ok_or(ProtocolError::MissingCode)?;
    let number = raw.as_u64().ok_or_else(|| {
        ProtocolError::MalformedEnvelope(format!(
            "`code` must be a non-negative integer, found {}",
            json_type_name(raw)
        ))
    })?;
    u8::try_from(number)
        .ok()
        .and_then(|byte| MessageCode::try_from(byte).ok())
        .ok_or(ProtocolError::UnknownCode(number))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
