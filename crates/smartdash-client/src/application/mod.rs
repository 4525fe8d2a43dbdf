//! Application layer of the device client.
//!
//! # What lives here?
//!
//! - **`transport`** – the [`Connector`](transport::Connector) port and the
//!   [`Transport`](transport::Transport) that owns the socket and drives the
//!   connection state machine (connect, send, receive, close, reconnect).
//!
//! - **`dispatch`** – the typed handler registry and the dispatcher that
//!   routes inbound envelopes to pending reads or pin handlers.
//!
//! - **`pending`** – the request-id correlation table behind `read` and
//!   `get_property`.
//!
//! - **`observer`** – the diagnostics port every component reports to.
//!
//! - **`client`** – [`SmartDash`](client::SmartDash), the public API and the
//!   receive-loop supervisor.
//!
//! Nothing in this layer names a concrete socket library or logger; those
//! are injected from `infrastructure`.

pub mod client;
pub mod dispatch;
pub mod observer;
pub mod pending;
pub mod transport;
