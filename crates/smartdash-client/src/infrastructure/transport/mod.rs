//! Socket adapters implementing the application's [`Connector`] port.
//!
//! - **`websocket`** – the production connector built on tokio-tungstenite
//!   (`ws://` and `wss://`).
//! - **`mock`** – an in-memory connector whose server side is scripted by
//!   tests.
//!
//! [`Connector`]: crate::application::transport::Connector

pub mod mock;
pub mod websocket;

pub use websocket::WebSocketConnector;
