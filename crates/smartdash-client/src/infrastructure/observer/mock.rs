//! Recording [`Observer`] for tests.

use std::sync::Mutex;

use smartdash_core::{ConnectionState, PinValue};

use crate::application::observer::Observer;

/// One recorded observer call.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    Info(String),
    Warn(String),
    Error(String),
    StateChanged(ConnectionState, ConnectionState),
    RemoteError(PinValue),
}

/// Observer that stores every event in call order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.filter(|e| match e {
            ObservedEvent::Warn(m) => Some(m.clone()),
            _ => None,
        })
    }

    pub fn errors(&self) -> Vec<String> {
        self.filter(|e| match e {
            ObservedEvent::Error(m) => Some(m.clone()),
            _ => None,
        })
    }

    /// Every `(from, to)` state change, in order.
    pub fn transitions(&self) -> Vec<(ConnectionState, ConnectionState)> {
        self.filter(|e| match e {
            ObservedEvent::StateChanged(from, to) => Some((*from, *to)),
            _ => None,
        })
    }

    pub fn remote_errors(&self) -> Vec<PinValue> {
        self.filter(|e| match e {
            ObservedEvent::RemoteError(v) => Some(v.clone()),
            _ => None,
        })
    }

    /// Text of every info, warning and error message.
    pub fn all_text(&self) -> Vec<String> {
        self.filter(|e| match e {
            ObservedEvent::Info(m) | ObservedEvent::Warn(m) | ObservedEvent::Error(m) => {
                Some(m.clone())
            }
            _ => None,
        })
    }

    fn filter<T>(&self, f: impl Fn(&ObservedEvent) -> Option<T>) -> Vec<T> {
        self.events.lock().unwrap().iter().filter_map(f).collect()
    }

    fn record(&self, event: ObservedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Observer for RecordingObserver {
    fn info(&self, message: &str) {
        self.record(ObservedEvent::Info(message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.record(ObservedEvent::Warn(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.record(ObservedEvent::Error(message.to_string()));
    }

    fn state_changed(&self, from: ConnectionState, to: ConnectionState) {
        self.record(ObservedEvent::StateChanged(from, to));
    }

    fn remote_error(&self, value: &PinValue) {
        self.record(ObservedEvent::RemoteError(value.clone()));
    }
}
