//! Connection lifecycle state machine.
//!
//! ```text
//!                 connect ok
//!   Connecting ───────────────▶ Authenticated
//!     │   ▲                          │
//!     │   │ retry                    │ close / socket closed
//!     ▼   │                          ▼
//!   Authenticating ──────────▶ Disconnected ──▶ Connecting (reconnect)
//!          close
//! ```
//!
//! Only the transport moves the machine.  Every edge not drawn above is
//! rejected with [`StateError::IllegalTransition`]; moving to the current
//! state is a no-op so idempotent operations such as `close()` stay quiet.

use std::fmt;

use thiserror::Error;
use tracing::warn;

/// Lifecycle state of the single dashboard connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Initial state, and the state while a connect attempt is in flight.
    #[default]
    Connecting,
    /// The last connect attempt failed (network error or token rejected).
    Authenticating,
    /// The socket is open and the server accepted the token.
    Authenticated,
    /// The socket was closed, locally or by the peer.
    Disconnected,
}

impl ConnectionState {
    /// Returns `true` when `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticated)
                | (Connecting, Authenticating)
                | (Connecting, Disconnected)
                | (Authenticating, Connecting)
                | (Authenticating, Disconnected)
                | (Authenticated, Disconnected)
                | (Disconnected, Connecting)
        )
    }

    /// Returns `true` only in [`ConnectionState::Authenticated`].
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Authenticated
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Error type for state machine operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("illegal connection state transition: {from} -> {to}")]
    IllegalTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

/// A state change that actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Tracks the current [`ConnectionState`] and enforces legal edges.
#[derive(Debug, Default)]
pub struct StateMachine {
    current: ConnectionState,
}

impl StateMachine {
    /// Creates a machine in [`ConnectionState::Connecting`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// `true` only while authenticated.
    pub fn connected(&self) -> bool {
        self.current.is_connected()
    }

    /// Moves to `next`.
    ///
    /// Returns `Ok(None)` when already in `next`, `Ok(Some(transition))` when
    /// the state changed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] for edges the lifecycle does
    /// not allow; the state is left unchanged.
    pub fn transition(&mut self, next: ConnectionState) -> Result<Option<Transition>, StateError> {
        if self.current == next {
            return Ok(None);
        }
        if !self.current.can_transition_to(next) {
            warn!("rejected connection state transition {} -> {}", self.current, next);
            return Err(StateError::IllegalTransition {
                from: self.current,
                to: next,
            });
        }
        let from = self.current;
        self.current = next;
        Ok(Some(Transition { from, to: next }))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
