//! Observability port.
//!
//! The client never logs through a global by itself: every noteworthy event
//! (state changes, connect failures, server-reported errors, bad frames,
//! failing handlers) is reported to an [`Observer`] injected at construction.
//! `infrastructure::observer` provides the `tracing`-backed default and a
//! recording implementation for tests.

use smartdash_core::{ConnectionState, PinValue};

/// Sink for client diagnostics.
///
/// Only the three severity methods are required; the structured methods
/// default to a formatted message at a sensible level.
pub trait Observer: Send + Sync {
    fn info(&self, message: &str);

    fn warn(&self, message: &str);

    fn error(&self, message: &str);

    /// The connection moved from `from` to `to`.
    fn state_changed(&self, from: ConnectionState, to: ConnectionState) {
        self.info(&format!("connection state {from} -> {to}"));
    }

    /// The server sent an `ERROR (8)` envelope.
    fn remote_error(&self, value: &PinValue) {
        self.error(&format!("dashboard reported an error: {value}"));
    }
}
