//! Domain entities for SmartDash devices.
//!
//! Pure logic with no infrastructure dependencies: the connection lifecycle
//! and its legal transitions.  The client crate drives the state machine from
//! its transport; nothing outside the transport mutates it.

/// Connection lifecycle states and transition rules.
///
/// See [`state::StateMachine`] for the main type.
pub mod state;
