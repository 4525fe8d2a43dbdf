//! Infrastructure layer for the device client.
//!
//! Concrete adapters for the ports declared in `application`:
//!
//! - **`transport`** – the tokio-tungstenite WebSocket connector, plus an
//!   in-memory connector for tests.
//! - **`observer`** – the `tracing`-backed observer, plus a recorder for tests.
//! - **`storage`** – TOML config file loading and saving.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain`, and
//! `smartdash_core`, but MUST NOT be imported by the `application` or domain
//! layers outside of tests.

pub mod observer;
pub mod storage;
pub mod transport;

use std::sync::Arc;

use crate::application::client::{ClientError, SmartDash};
use crate::domain::ClientConfig;

/// Builds a client wired to the real WebSocket connector and the `tracing`
/// observer.
///
/// # Errors
///
/// See [`SmartDash::with_parts`].
pub fn websocket_client(config: ClientConfig) -> Result<Arc<SmartDash>, ClientError> {
    SmartDash::with_parts(
        config,
        Arc::new(transport::WebSocketConnector::new()),
        Arc::new(observer::TracingObserver::new()),
    )
}
