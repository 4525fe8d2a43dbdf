//! In-memory [`Connector`] for tests.
//!
//! Every successful `open` creates a fresh channel pair and queues a
//! [`MockServer`] handle that the test picks up with
//! [`MockConnector::accept`].  The server handle can push frames to the
//! client, read what the client sent, and close the connection.
//!
//! Keep the `MockServer` alive for as long as the connection should stay up:
//! dropping it ends the client's stream like a remote close.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::transport::{
    Connector, FrameSink, FrameStream, SocketHalves, TransportError,
};

enum ServerFrame {
    Text(String),
    Close,
}

/// Scriptable connector.  Succeeds by default.
pub struct MockConnector {
    fail_connect: AtomicBool,
    opens: AtomicUsize,
    open_delay: Mutex<Duration>,
    last_uri: Mutex<Option<String>>,
    accepted_tx: mpsc::UnboundedSender<MockServer>,
    accepted_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockServer>>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            fail_connect: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            open_delay: Mutex::new(Duration::ZERO),
            last_uri: Mutex::new(None),
            accepted_tx,
            accepted_rx: tokio::sync::Mutex::new(accepted_rx),
        }
    }

    /// Makes subsequent `open` calls fail (or succeed again).
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Makes every `open` take `delay` before it resolves.
    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock().unwrap() = delay;
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// URI of the most recent open attempt.
    pub fn last_uri(&self) -> Option<String> {
        self.last_uri.lock().unwrap().clone()
    }

    /// Waits for the server side of the next accepted connection.
    pub async fn accept(&self) -> MockServer {
        self.accepted_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, uri: &str) -> Result<SocketHalves, TransportError> {
        *self.last_uri.lock().unwrap() = Some(uri.to_string());
        let delay = *self.open_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed {
                endpoint: "mock".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let client_closed = Arc::new(AtomicBool::new(false));

        let server = MockServer {
            to_client,
            from_client,
            closed: Arc::clone(&closed),
            client_closed: Arc::clone(&client_closed),
        };
        let _ = self.accepted_tx.send(server);

        Ok(SocketHalves {
            sink: Box::new(MockSink {
                to_server,
                closed,
                client_closed,
            }),
            stream: Box::new(MockStream { from_server }),
        })
    }
}

/// Server side of one mock connection.
pub struct MockServer {
    to_client: mpsc::UnboundedSender<ServerFrame>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
    client_closed: Arc<AtomicBool>,
}

impl MockServer {
    /// Delivers one text frame to the client.
    pub fn push(&self, text: &str) {
        let _ = self.to_client.send(ServerFrame::Text(text.to_string()));
    }

    /// Closes the connection from the server side: pending and future
    /// client receives fail, and so do client sends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.to_client.send(ServerFrame::Close);
    }

    /// Next frame the client sent, waiting for it.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame the client sent, if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// `true` once the client performed a close handshake on this socket.
    pub fn was_closed_by_client(&self) -> bool {
        self.client_closed.load(Ordering::SeqCst)
    }
}

struct MockSink {
    to_server: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    client_closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.to_server
            .send(text)
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.client_closed.store(true, Ordering::SeqCst);
    }
}

struct MockStream {
    from_server: mpsc::UnboundedReceiver<ServerFrame>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_text(&mut self) -> Result<String, TransportError> {
        match self.from_server.recv().await {
            Some(ServerFrame::Text(text)) => Ok(text),
            Some(ServerFrame::Close) | None => Err(TransportError::Closed),
        }
    }
}
