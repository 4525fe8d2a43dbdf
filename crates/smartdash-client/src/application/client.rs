//! The device client: public API and receive-loop supervisor.
//!
//! [`SmartDash`] ties the pieces together:
//!
//! ```text
//! caller ── write/read/switch_trigger ──► codec ──► Transport::send
//!                                                        │
//! receive loop ◄── Transport::receive ◄──────────────────┘
//!      │
//!      └─► Dispatcher ──► pending read waiters
//!                    └──► pin handlers (registration order)
//! ```
//!
//! # Supervision (for beginners)
//!
//! [`SmartDash::start`] spawns one receive loop.  The loop ends when the
//! connection closes.  [`SmartDash::run`] is the long-running supervisor:
//! it connects, starts the loop, waits for it to end, disconnects and starts
//! over, forever, until [`SmartDash::shutdown`] is called.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use smartdash_core::protocol::SequenceCounter;
use smartdash_core::{encode_envelope, ConnectionState, Envelope, MessageCode, PinValue, ProtocolError};
use thiserror::Error;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::application::dispatch::{Dispatcher, PinHandler};
use crate::application::observer::Observer;
use crate::application::pending::Answer;
use crate::application::transport::{Connector, Transport, TransportError};
use crate::domain::ClientConfig;

tokio::task_local! {
    /// Set inside the receive loop task so `read` called from a handler
    /// pumps frames itself instead of waiting on the (busy) loop.
    static IN_RECEIVE_LOOP: bool;
}

/// Errors returned by the public client API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection is not authenticated; nothing was sent.
    #[error("not connected to the dashboard")]
    NotConnected,

    /// The socket closed while sending.  The message was dropped and a
    /// reconnect has already been attempted.
    #[error("connection closed; message dropped")]
    ConnectionClosed,

    /// The operation is not enabled in this client's capabilities.
    #[error("{operation} is disabled for this client")]
    Disabled { operation: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotConnected => ClientError::NotConnected,
            TransportError::Closed => ClientError::ConnectionClosed,
            other => ClientError::Transport(other),
        }
    }
}

struct ReceiveTask {
    id: u64,
    handle: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

/// An auto-reconnecting connection to a SmartDash dashboard.
///
/// Created once per device and shared behind an `Arc`; every method takes
/// `&self` so handlers can call back into the client.
pub struct SmartDash {
    config: ClientConfig,
    transport: Transport,
    dispatcher: Dispatcher,
    request_ids: SequenceCounter,
    observer: Arc<dyn Observer>,
    receive_task: Mutex<Option<ReceiveTask>>,
    next_task_id: AtomicU64,
    supervising: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl SmartDash {
    /// Builds a client from its configuration and the two injected ports.
    ///
    /// Nothing is connected yet; call [`connect`](Self::connect) or
    /// [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] for an empty token or an
    /// address that does not form a valid URI.
    pub fn with_parts(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        observer: Arc<dyn Observer>,
    ) -> Result<Arc<Self>, ClientError> {
        if config.token.trim().is_empty() {
            return Err(ClientError::InvalidConfig("token must not be empty".to_string()));
        }
        let uri = config
            .uri()
            .map_err(|e| ClientError::InvalidConfig(format!("bad server address: {e}")))?;

        let transport = Transport::new(
            connector,
            uri.to_string(),
            config.endpoint(),
            config.reconnect_delay(),
            Arc::clone(&observer),
        );
        let (shutdown, _) = watch::channel(false);

        Ok(Arc::new(Self {
            dispatcher: Dispatcher::new(Arc::clone(&observer)),
            transport,
            request_ids: SequenceCounter::new(),
            observer,
            receive_task: Mutex::new(None),
            next_task_id: AtomicU64::new(1),
            supervising: AtomicBool::new(false),
            shutdown,
            config,
        }))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ── Connection ────────────────────────────────────────────────────────────

    /// Opens the connection.  Failures are reported to the observer and
    /// leave the client in `Authenticating`; returns whether it succeeded.
    pub async fn connect(&self) -> bool {
        self.transport.connect().await
    }

    /// Closes the connection and abandons outstanding reads.
    pub async fn disconnect(&self) {
        self.transport.close().await;
        self.dispatcher.pending().fail_all();
    }

    pub fn connected(&self) -> bool {
        self.transport.connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Watch channel for state changes (e.g. to wait for `Authenticated`).
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.transport.subscribe_state()
    }

    // ── Outbound operations ───────────────────────────────────────────────────

    /// Pushes `value` to virtual pin `pin`.
    pub async fn write(&self, pin: &str, value: impl Into<PinValue>) -> Result<(), ClientError> {
        self.send(&Envelope::write_pin(pin, value)).await
    }

    /// Fires (`true`) or releases (`false`) the trigger bound to `pin`.
    pub async fn switch_trigger(&self, pin: &str, on: bool) -> Result<(), ClientError> {
        self.send(&Envelope::trigger(pin, on)).await
    }

    /// Flips the dashboard switch bound to trigger `pin`.
    pub async fn trigger_switch(&self, pin: &str, on: bool) -> Result<(), ClientError> {
        self.send(&Envelope::trigger_switch(pin, on)).await
    }

    /// Asks the dashboard for the current value of `pin`.
    ///
    /// Returns `Ok(None)` if no answer arrives within the read timeout or
    /// the connection drops while waiting.
    pub async fn read(&self, pin: &str) -> Result<Option<PinValue>, ClientError> {
        let id = self.request_ids.next();
        self.request(Envelope::read_pin(pin, id), id, MessageCode::ReadPin, pin)
            .await
    }

    /// Reads widget property `property` of `pin`.  Requires the
    /// `properties` capability.
    pub async fn get_property(
        &self,
        pin: &str,
        property: &str,
    ) -> Result<Option<PinValue>, ClientError> {
        self.require(self.config.capabilities.properties, "get_property")?;
        let id = self.request_ids.next();
        let envelope = Envelope::get_property(pin, property, id);
        self.request(envelope, id, MessageCode::GetProperty, pin)
            .await
    }

    /// Sets widget property `property` of `pin`.  Requires the `properties`
    /// capability.
    pub async fn set_property(
        &self,
        pin: &str,
        property: &str,
        value: impl Into<PinValue>,
    ) -> Result<(), ClientError> {
        self.require(self.config.capabilities.properties, "set_property")?;
        self.send(&Envelope::set_property(pin, property, value)).await
    }

    /// Asks the dashboard to relay a text message.  Requires the
    /// `notifications` capability.
    pub async fn send_sms(&self, text: &str) -> Result<(), ClientError> {
        self.require(self.config.capabilities.notifications, "send_sms")?;
        self.send(&Envelope::send_sms(text)).await
    }

    /// Asks the dashboard to relay an e-mail.  Requires the `notifications`
    /// capability.
    pub async fn send_email(&self, text: &str) -> Result<(), ClientError> {
        self.require(self.config.capabilities.notifications, "send_email")?;
        self.send(&Envelope::send_email(text)).await
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    /// Registers `handler` for values pushed to `pin`.  Handlers for the
    /// same pin run in registration order.
    pub fn on_data<H>(&self, pin: impl Into<String>, handler: H)
    where
        H: PinHandler + 'static,
    {
        self.dispatcher.register(pin, Arc::new(handler));
    }

    // ── Supervision ───────────────────────────────────────────────────────────

    /// Spawns the receive loop unless one is already running.
    ///
    /// Returns `true` if a new loop was spawned.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut slot = self.task_slot();
        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return false;
        }

        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done) = watch::channel(false);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            IN_RECEIVE_LOOP.scope(true, this.receive_loop()).await;
            this.clear_task(id);
            let _ = done_tx.send(true);
        });
        *slot = Some(ReceiveTask { id, handle, done });
        true
    }

    /// `true` while a receive loop task is alive.
    pub fn receive_loop_active(&self) -> bool {
        self.task_slot()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Keeps the device online until [`shutdown`](Self::shutdown).
    ///
    /// A second concurrent call does not start another supervisor; it just
    /// waits for shutdown.
    pub async fn run(self: &Arc<Self>) {
        if self.supervising.swap(true, Ordering::AcqRel) {
            self.observer
                .warn("supervisor already running; waiting for shutdown");
            wait_until_set(self.shutdown.subscribe()).await;
            return;
        }

        let mut first = true;
        while !self.shutting_down() {
            tokio::select! {
                _ = self.supervise_once(first) => {}
                _ = wait_until_set(self.shutdown.subscribe()) => break,
            }
            first = false;
        }
        self.supervising.store(false, Ordering::Release);
    }

    /// Stops the supervisor and the receive loop, then closes the socket.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task_slot().take() {
            task.handle.abort();
        }
        self.disconnect().await;
        self.observer.info("client shut down");
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    async fn supervise_once(self: &Arc<Self>, first: bool) {
        if !self.connected() {
            let mut up = first && self.connect().await;
            while !up {
                up = self.transport.reconnect().await;
            }
        }

        self.start();
        if let Some(done) = self.task_done() {
            wait_until_set(done).await;
        }
        self.disconnect().await;
    }

    async fn receive_loop(&self) {
        debug!("receive loop started");
        loop {
            match self.transport.receive().await {
                Ok(text) => {
                    debug!("<- {text}");
                    self.dispatcher.dispatch_frame(&text).await;
                }
                Err(TransportError::Replaced) => continue,
                Err(e) => {
                    self.observer.info(&format!("receive loop stopped: {e}"));
                    break;
                }
            }
        }
    }

    async fn send(&self, envelope: &Envelope) -> Result<(), ClientError> {
        let text = encode_envelope(envelope)?;
        debug!("-> {text}");
        self.transport.send(text).await.map_err(ClientError::from)
    }

    /// Sends a request envelope and waits for the matching answer.
    async fn request(
        &self,
        envelope: Envelope,
        id: u64,
        code: MessageCode,
        pin: &str,
    ) -> Result<Option<PinValue>, ClientError> {
        let pending = self.dispatcher.pending();
        let mut answer = pending.register(id, code, pin);
        if let Err(e) = self.send(&envelope).await {
            pending.cancel(id);
            return Err(e);
        }

        let waited = tokio::time::timeout(self.config.read_timeout(), self.await_answer(&mut answer)).await;
        pending.cancel(id);
        match waited {
            Ok(value) => Ok(value),
            Err(_) => {
                self.observer.warn(&format!(
                    "no answer for request {id} on pin {pin} within {:?}",
                    self.config.read_timeout()
                ));
                Ok(None)
            }
        }
    }

    /// Waits on the receive loop when one is serving frames, otherwise pulls
    /// frames through the dispatcher until the answer shows up.
    async fn await_answer(&self, answer: &mut oneshot::Receiver<Answer>) -> Option<PinValue> {
        let inside_loop = IN_RECEIVE_LOOP.try_with(|v| *v).unwrap_or(false);
        loop {
            match answer.try_recv() {
                Ok(value) => return value,
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => {}
            }
            if !inside_loop && self.receive_loop_active() {
                return answer.await.ok().flatten();
            }
            match self.transport.receive().await {
                Ok(text) => {
                    debug!("<- {text}");
                    self.dispatcher.dispatch_frame(&text).await;
                }
                Err(TransportError::Replaced) => continue,
                Err(_) => return None,
            }
        }
    }

    fn require(&self, enabled: bool, operation: &'static str) -> Result<(), ClientError> {
        if enabled {
            return Ok(());
        }
        self.observer
            .warn(&format!("{operation} is disabled for this client"));
        Err(ClientError::Disabled { operation })
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn task_done(&self) -> Option<watch::Receiver<bool>> {
        self.task_slot().as_ref().map(|task| task.done.clone())
    }

    fn clear_task(&self, id: u64) {
        let mut slot = self.task_slot();
        if slot.as_ref().is_some_and(|task| task.id == id) {
            *slot = None;
        }
    }

    fn task_slot(&self) -> std::sync::MutexGuard<'_, Option<ReceiveTask>> {
        self.receive_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Resolves once the flag is `true` or its sender is gone.
async fn wait_until_set(mut flag: watch::Receiver<bool>) {
    let _ = flag.wait_for(|set| *set).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
