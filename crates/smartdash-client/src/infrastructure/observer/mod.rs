//! [`Observer`] implementations.
//!
//! [`TracingObserver`] is the default used by the binary: every event
//! becomes a `tracing` event, so the usual `RUST_LOG` filtering applies.
//! The `mock` module holds a recorder for tests.

pub mod mock;

use smartdash_core::{ConnectionState, PinValue};
use tracing::{error, info, warn};

use crate::application::observer::Observer;

/// Forwards client diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for TracingObserver {
    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn warn(&self, message: &str) {
        warn!("{message}");
    }

    fn error(&self, message: &str) {
        error!("{message}");
    }

    fn state_changed(&self, from: ConnectionState, to: ConnectionState) {
        info!(%from, %to, "connection state changed");
    }

    fn remote_error(&self, value: &PinValue) {
        error!(%value, "dashboard reported an error");
    }
}
