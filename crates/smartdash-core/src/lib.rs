//! # smartdash-core
//!
//! Shared library for SmartDash devices containing the wire protocol types,
//! the JSON codec, and the connection lifecycle state machine.
//!
//! It has zero dependencies on sockets, async runtimes, or UI frameworks, so
//! everything in here can be unit-tested without a server.
//!
//! # Architecture overview (for beginners)
//!
//! A SmartDash *device* keeps one WebSocket connection open to a dashboard
//! server.  Both sides exchange tiny JSON objects addressed to *virtual pins*
//! (named channels such as `"V1"`), for example:
//!
//! ```json
//! {"code":1,"pin":"V1","value":7}
//! ```
//!
//! This crate defines:
//!
//! - **`protocol`** – the envelope shape (`code`, `pin`, `value`), the
//!   numeric message codes, and the codec that turns envelopes into JSON text
//!   and back, including batch frames (a JSON array of envelopes).
//!
//! - **`domain`** – the connection state machine
//!   (Connecting → Authenticated → Disconnected, with an Authenticating
//!   failure branch) and the rules about which transitions are legal.

pub mod domain;
pub mod protocol;

pub use domain::state::{ConnectionState, StateError, StateMachine, Transition};
pub use protocol::codec::{decode_frame, encode_batch, encode_envelope, DecodedFrame, ProtocolError};
pub use protocol::messages::{Envelope, MessageCode, PinValue};
