//! Connection lifecycle over an abstract socket.
//!
//! [`Transport`] owns the one live socket of a client and drives the
//! [`StateMachine`] from smartdash-core.  The socket itself sits behind the
//! [`Connector`] port so the whole lifecycle can be exercised in tests with
//! the in-memory connector from `infrastructure::transport::mock`.
//!
//! # Locks (for beginners)
//!
//! Reading and writing happen on different halves of the socket, each
//! behind its own async mutex:
//!
//! - `outbound` serializes senders so two frames never interleave.
//! - `inbound` is the *receive guard*: at most one task is reading at a
//!   time, whether that is the receive loop or a `read` call pumping frames
//!   itself.
//!
//! Replacing or closing the socket bumps a *generation* counter.  A receiver
//! blocked on the old socket notices the bump, returns
//! [`TransportError::Replaced`], and releases the guard so the new socket can
//! be installed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use smartdash_core::{ConnectionState, StateMachine};
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info};

use crate::application::observer::Observer;

/// Errors produced by the socket layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No socket is installed, or the connection is not authenticated.
    #[error("not connected")]
    NotConnected,
    /// The remote side closed the connection or the socket failed.
    #[error("connection closed")]
    Closed,
    /// The socket this receive was waiting on was replaced or closed locally.
    #[error("socket replaced while receiving")]
    Replaced,
    /// Opening the connection failed.  `endpoint` never contains the token.
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectFailed { endpoint: String, reason: String },
    /// Any other I/O failure on an open socket.
    #[error("socket I/O error: {0}")]
    Io(String),
}

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Write half of a connected socket.
#[async_trait]
pub trait FrameSink: Send {
    /// Sends one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Closes the socket.  Errors are ignored; the socket is gone either way.
    async fn close(&mut self);
}

/// Read half of a connected socket.
#[async_trait]
pub trait FrameStream: Send {
    /// Waits for the next text frame.  Control frames are handled
    /// internally; a closed socket yields [`TransportError::Closed`].
    async fn next_text(&mut self) -> Result<String, TransportError>;
}

/// Both halves of a freshly opened socket.
pub struct SocketHalves {
    pub sink: Box<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

/// Opens sockets.  Implemented by the WebSocket adapter and by the test mock.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, uri: &str) -> Result<SocketHalves, TransportError>;
}

// ── Transport ─────────────────────────────────────────────────────────────────

struct Inbound {
    generation: u64,
    stream: Box<dyn FrameStream>,
}

/// Owns the socket and the connection state of one client.
pub struct Transport {
    connector: Arc<dyn Connector>,
    uri: String,
    endpoint: String,
    reconnect_delay: Duration,
    state: Mutex<StateMachine>,
    state_tx: watch::Sender<ConnectionState>,
    outbound: AsyncMutex<Option<Box<dyn FrameSink>>>,
    inbound: AsyncMutex<Option<Inbound>>,
    generation: watch::Sender<u64>,
    connect_lock: AsyncMutex<()>,
    observer: Arc<dyn Observer>,
}

impl Transport {
    /// Creates a transport in the `Connecting` state with no socket.
    ///
    /// `uri` is what the connector opens; `endpoint` is the same address
    /// without credentials and is the only form that is ever logged.
    pub fn new(
        connector: Arc<dyn Connector>,
        uri: impl Into<String>,
        endpoint: impl Into<String>,
        reconnect_delay: Duration,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let machine = StateMachine::new();
        let (state_tx, _) = watch::channel(machine.current());
        let (generation, _) = watch::channel(0);
        Self {
            connector,
            uri: uri.into(),
            endpoint: endpoint.into(),
            reconnect_delay,
            state: Mutex::new(machine),
            state_tx,
            outbound: AsyncMutex::new(None),
            inbound: AsyncMutex::new(None),
            generation,
            connect_lock: AsyncMutex::new(()),
            observer,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.machine().current()
    }

    pub fn connected(&self) -> bool {
        self.machine().connected()
    }

    /// Watch channel that sees every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Opens a new socket, replacing any previous one.
    ///
    /// Returns `true` when the connection is authenticated.  Failures leave
    /// the state at `Authenticating` and are reported to the observer.  A
    /// [`close`](Self::close) that lands while the socket is still opening
    /// wins: the new socket is closed again and `false` is returned.
    pub async fn connect(&self) -> bool {
        let _serial = self.connect_lock.lock().await;
        self.connect_locked().await
    }

    /// Waits the reconnect delay, then connects.
    ///
    /// If another task re-established the connection during the wait, that
    /// connection is kept.
    pub async fn reconnect(&self) -> bool {
        self.observer.info(&format!(
            "reconnecting to {} in {:?}",
            self.endpoint, self.reconnect_delay
        ));
        tokio::time::sleep(self.reconnect_delay).await;

        let _serial = self.connect_lock.lock().await;
        if self.connected() {
            debug!("{} already reconnected", self.endpoint);
            return true;
        }
        self.connect_locked().await
    }

    /// Body of [`connect`](Self::connect).  The caller holds `connect_lock`.
    async fn connect_locked(&self) -> bool {
        if self.state() == ConnectionState::Authenticated {
            self.drop_socket().await;
            self.set_state(ConnectionState::Disconnected);
        }
        self.set_state(ConnectionState::Connecting);
        info!("connecting to {}", self.endpoint);

        let ticket = *self.generation.borrow();
        let mut halves = match self.connector.open(&self.uri).await {
            Ok(halves) => halves,
            Err(e) => {
                if *self.generation.borrow() == ticket {
                    self.set_state(ConnectionState::Authenticating);
                }
                self.observer.warn(&format!("connect failed: {e}"));
                return false;
            }
        };

        if *self.generation.borrow() != ticket {
            info!("connection to {} closed while opening", self.endpoint);
            halves.sink.close().await;
            return false;
        }

        let generation = self.bump_generation();
        *self.outbound.lock().await = Some(halves.sink);
        *self.inbound.lock().await = Some(Inbound {
            generation,
            stream: halves.stream,
        });
        if self.set_state(ConnectionState::Authenticated) {
            return true;
        }

        // Closed between the ticket check and the install.
        self.bump_generation();
        let sink = self.outbound.lock().await.take();
        if let Some(mut sink) = sink {
            sink.close().await;
        }
        *self.inbound.lock().await = None;
        false
    }

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotConnected`] unless authenticated.
    /// - [`TransportError::Closed`] when the socket failed.  The state moves
    ///   to `Disconnected`, a reconnect runs before this returns, and the
    ///   frame is **not** resent.
    pub async fn send(&self, text: String) -> Result<(), TransportError> {
        if !self.connected() {
            return Err(TransportError::NotConnected);
        }

        let mut outbound = self.outbound.lock().await;
        let Some(sink) = outbound.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        match sink.send_text(text).await {
            Ok(()) => Ok(()),
            Err(e) => {
                *outbound = None;
                drop(outbound);
                self.observer
                    .warn(&format!("send failed ({e}); dropping frame and reconnecting"));
                self.drop_socket().await;
                self.set_state(ConnectionState::Disconnected);
                self.reconnect().await;
                Err(TransportError::Closed)
            }
        }
    }

    /// Receives one text frame.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotConnected`] when no socket is installed.
    /// - [`TransportError::Replaced`] when the socket was swapped or closed
    ///   locally while waiting; callers that loop should simply retry.
    /// - [`TransportError::Closed`] when the remote side went away.  The
    ///   state moves to `Disconnected`.
    pub async fn receive(&self) -> Result<String, TransportError> {
        let mut replaced = self.generation.subscribe();
        let mut inbound = self.inbound.lock().await;
        let current = *replaced.borrow_and_update();

        let Some(slot) = inbound.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        if slot.generation != current {
            return Err(TransportError::Replaced);
        }

        let result = tokio::select! {
            frame = slot.stream.next_text() => frame,
            _ = replaced.changed() => return Err(TransportError::Replaced),
        };

        match result {
            Ok(text) => Ok(text),
            Err(e) => {
                debug!("receive failed: {e}");
                *inbound = None;
                drop(inbound);
                // Only tear down if nobody installed a newer socket meanwhile.
                if *self.generation.borrow() == current {
                    *self.outbound.lock().await = None;
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(TransportError::Closed)
            }
        }
    }

    /// Closes the socket if one is open and moves to `Disconnected`.
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        self.bump_generation();
        let sink = self.outbound.lock().await.take();
        if let Some(mut sink) = sink {
            sink.close().await;
            info!("closed connection to {}", self.endpoint);
        }
        *self.inbound.lock().await = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Forgets both halves without a close handshake.
    async fn drop_socket(&self) {
        self.bump_generation();
        *self.outbound.lock().await = None;
        *self.inbound.lock().await = None;
    }

    fn bump_generation(&self) -> u64 {
        let mut next = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            next = *g;
        });
        next
    }

    fn set_state(&self, next: ConnectionState) -> bool {
        let outcome = self.machine().transition(next);
        match outcome {
            Ok(Some(t)) => {
                self.state_tx.send_replace(t.to);
                self.observer.state_changed(t.from, t.to);
                true
            }
            Ok(None) => true,
            Err(e) => {
                self.observer.warn(&e.to_string());
                false
            }
        }
    }

    fn machine(&self) -> std::sync::MutexGuard<'_, StateMachine> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
