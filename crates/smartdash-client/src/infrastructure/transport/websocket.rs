//! WebSocket connector.
//!
//! Opens the dashboard URI with `tokio_tungstenite::connect_async` and splits
//! the stream into a sink and a stream half, each wrapped in the
//! application's frame traits.
//!
//! Only text frames carry protocol messages.  Binary frames are accepted if
//! they hold UTF-8 text; ping/pong are answered by tungstenite itself and are
//! skipped here.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::application::transport::{
    Connector, FrameSink, FrameStream, SocketHalves, TransportError,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production [`Connector`] for `ws://` / `wss://` URIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, uri: &str) -> Result<SocketHalves, TransportError> {
        let (socket, response) =
            connect_async(uri)
                .await
                .map_err(|e| TransportError::ConnectFailed {
                    endpoint: redact(uri),
                    reason: e.to_string(),
                })?;
        debug!("WebSocket handshake complete (HTTP {})", response.status());

        let (sink, stream) = socket.split();
        Ok(SocketHalves {
            sink: Box::new(WsSink { sink }),
            stream: Box::new(WsStream { stream }),
        })
    }
}

struct WsSink {
    sink: SplitSink<Socket, WsMessage>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink.send(WsMessage::Text(text)).await.map_err(map_ws_error)
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!("error while closing WebSocket: {e}");
        }
    }
}

struct WsStream {
    stream: SplitStream<Socket>,
}

#[async_trait]
impl FrameStream for WsStream {
    async fn next_text(&mut self) -> Result<String, TransportError> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => return Err(TransportError::Closed),
            };

            match msg {
                WsMessage::Text(text) => return Ok(text),
                WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(text),
                    Err(_) => warn!("non-UTF-8 binary frame (ignored)"),
                },
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                WsMessage::Close(frame) => {
                    debug!("server sent Close: {frame:?}");
                    return Err(TransportError::Closed);
                }
            }
        }
    }
}

fn map_ws_error(e: WsError) -> TransportError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Io(_) => {
            TransportError::Closed
        }
        other => TransportError::Io(other.to_string()),
    }
}

/// Strips the query string (which carries the token) from `uri`.
fn redact(uri: &str) -> String {
    match uri.split_once('?') {
        Some((base, _)) => base.to_string(),
        None => uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_removes_token() {
        assert_eq!(redact("ws://h:8000/ws/?token=secret"), "ws://h:8000/ws/");
        assert_eq!(redact("ws://h/ws/"), "ws://h/ws/");
    }

    #[test]
    fn test_closed_errors_map_to_closed() {
        assert_eq!(map_ws_error(WsError::ConnectionClosed), TransportError::Closed);
        assert_eq!(map_ws_error(WsError::AlreadyClosed), TransportError::Closed);
    }

    #[tokio::test]
    async fn test_connect_refused_is_reported_without_token() {
        // Arrange – port 1 on loopback refuses connections
        let connector = WebSocketConnector::new();

        // Act
        let result = connector.open("ws://127.0.0.1:1/ws/?token=secret").await;

        // Assert
        match result {
            Err(TransportError::ConnectFailed { endpoint, .. }) => {
                assert_eq!(endpoint, "ws://127.0.0.1:1/ws/");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connection to port 1 must fail"),
        }
    }
}
