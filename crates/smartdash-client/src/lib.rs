//! smartdash-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does smartdash-client do? (for beginners)
//!
//! A *device* (a Raspberry Pi, a sensor box, a game on a laptop) wants to
//! show values on a web dashboard and react to buttons pressed there.  This
//! crate keeps one WebSocket connection to the dashboard open for the whole
//! life of the process:
//!
//! 1. Connects to `ws://<server>:<port>/ws/?token=<token>`.
//! 2. Sends values with [`SmartDash::write`] and asks for them with
//!    [`SmartDash::read`].
//! 3. Runs user handlers registered with [`SmartDash::on_data`] whenever the
//!    dashboard pushes a value to a virtual pin.
//! 4. Reconnects after a fixed delay whenever the connection drops, forever,
//!    until [`SmartDash::shutdown`].
//!
//! ```no_run
//! use smartdash_client::{handler_fn, websocket_client, ClientConfig};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let client = websocket_client(ClientConfig::new("YOUR_TOKEN"))?;
//! client.on_data("V3", handler_fn(|value| {
//!     println!("button V3 -> {value}");
//!     Ok(())
//! }));
//! client.run().await;
//! # Ok(())
//! # }
//! ```

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: transport lifecycle, dispatch, and the client API.
pub mod application;

/// Infrastructure layer: WebSocket, tracing, and config-file adapters.
pub mod infrastructure;

pub use application::client::{ClientError, SmartDash};
pub use application::dispatch::{async_handler_fn, handler_fn, PinHandler};
pub use application::observer::Observer;
pub use application::transport::{Connector, TransportError};
pub use domain::{Capabilities, ClientConfig};
pub use infrastructure::websocket_client;
pub use smartdash_core::{ConnectionState, PinValue};
