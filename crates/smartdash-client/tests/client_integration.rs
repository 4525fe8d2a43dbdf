//! End-to-end tests of the client against the in-memory connector.
//!
//! Each test plays the dashboard through a `MockServer` handle and checks
//! what the device sends, which handlers run, and how the connection state
//! moves.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use smartdash_client::infrastructure::observer::mock::RecordingObserver;
use smartdash_client::infrastructure::transport::mock::{MockConnector, MockServer};
use smartdash_client::{async_handler_fn, handler_fn, ClientConfig, ConnectionState, PinValue, SmartDash};
use smartdash_core::{decode_frame, DecodedFrame, Envelope};
use tokio_test::{assert_err, assert_ok};

const WAIT: Duration = Duration::from_secs(2);

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Harness {
    client: Arc<SmartDash>,
    connector: Arc<MockConnector>,
    observer: Arc<RecordingObserver>,
}

fn harness_with(config: ClientConfig) -> Harness {
    let connector = Arc::new(MockConnector::new());
    let observer = Arc::new(RecordingObserver::new());
    let client = SmartDash::with_parts(config, connector.clone(), observer.clone())
        .expect("valid config");
    Harness {
        client,
        connector,
        observer,
    }
}

fn harness() -> Harness {
    harness_with(ClientConfig {
        reconnect_delay_ms: 10,
        read_timeout_ms: 500,
        ..ClientConfig::new("abc")
    })
}

/// Connects and returns the server side of the connection.
async fn connected(h: &Harness) -> MockServer {
    assert!(h.client.connect().await);
    h.connector.accept().await
}

/// Polls `cond` until it holds or the test budget runs out.
async fn eventually(what: &str, cond: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

async fn next_frame(server: &mut MockServer) -> Envelope {
    let text = tokio::time::timeout(WAIT, server.recv())
        .await
        .expect("client sent nothing")
        .expect("connection gone");
    match decode_frame(&text).expect("valid frame") {
        DecodedFrame::Single(env) => env,
        DecodedFrame::Batch(_) => panic!("client never sends batches"),
    }
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl smartdash_client::PinHandler {
    let log = Arc::clone(log);
    handler_fn(move |value| {
        log.lock().unwrap().push(format!("{tag}={value}"));
        Ok(())
    })
}

// ── Outbound ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_write_emits_exactly_one_write_envelope() {
    // Arrange
    let h = harness();
    let mut server = connected(&h).await;

    // Act
    assert_ok!(h.client.write("V1", 7).await);

    // Assert
    let text = server.recv().await.unwrap();
    assert_eq!(text, r#"{"code":1,"pin":"V1","value":7}"#);
    assert!(server.try_recv().is_none());
    assert_eq!(
        h.connector.last_uri().as_deref(),
        Some("ws://127.0.0.1:8000/ws/?token=abc")
    );
}

#[tokio::test]
async fn test_send_close_reconnects_before_next_send() {
    // Arrange
    let h = harness();
    let first = connected(&h).await;
    let mut states = h.client.subscribe_state();
    first.close();

    // Act
    let lost = h.client.write("V1", 1).await;
    let mut second = h.connector.accept().await;
    assert_ok!(h.client.write("V1", 2).await);

    // Assert
    assert_err!(lost);
    assert_eq!(*states.borrow_and_update(), ConnectionState::Authenticated);
    assert_eq!(
        h.observer.transitions(),
        vec![
            (ConnectionState::Connecting, ConnectionState::Authenticated),
            (ConnectionState::Authenticated, ConnectionState::Disconnected),
            (ConnectionState::Disconnected, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Authenticated),
        ]
    );
    assert_eq!(second.recv().await.unwrap(), r#"{"code":1,"pin":"V1","value":2}"#);
}

// ── Inbound dispatch ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_error_push_is_reported_and_loop_continues() {
    // Arrange
    let h = harness();
    let server = connected(&h).await;
    let log = Arc::new(Mutex::new(Vec::new()));
    h.client.on_data("V1", recorder(&log, "V1"));
    h.client.start();

    // Act
    server.push(r#"{"code":8,"value":"bad pin"}"#);
    server.push(r#"{"code":1,"pin":"V1","value":4}"#);

    // Assert
    eventually("V1 handler", || !log.lock().unwrap().is_empty()).await;
    assert_eq!(h.observer.remote_errors(), vec![PinValue::from("bad pin")]);
    assert_eq!(*log.lock().unwrap(), vec!["V1=4"]);
    assert!(h.client.receive_loop_active());
}

#[tokio::test]
async fn test_batch_fires_three_handlers_in_order() {
    // Arrange
    let h = harness();
    let server = connected(&h).await;
    let log = Arc::new(Mutex::new(Vec::new()));
    h.client.on_data("V1", recorder(&log, "V1"));
    h.client.on_data("V2", recorder(&log, "V2"));
    h.client.on_data("V3", recorder(&log, "V3"));
    h.client.start();

    // Act
    server.push(
        r#"[{"code":1,"pin":"V1","value":1},{"code":1,"pin":"V2","value":"two"},{"code":1,"pin":"V3","value":true}]"#,
    );

    // Assert
    eventually("three handlers", || log.lock().unwrap().len() == 3).await;
    assert_eq!(*log.lock().unwrap(), vec!["V1=1", "V2=two", "V3=true"]);
}

#[tokio::test]
async fn test_unhandled_pin_and_garbage_are_ignored() {
    // Arrange
    let h = harness();
    let server = connected(&h).await;
    let log = Arc::new(Mutex::new(Vec::new()));
    h.client.on_data("V9", recorder(&log, "V9"));
    h.client.start();

    // Act
    server.push(r#"{"code":1,"pin":"V5","value":1}"#);
    server.push("definitely not json");
    server.push(r#"{"code":1,"pin":"V9","value":9}"#);

    // Assert
    eventually("V9 handler", || !log.lock().unwrap().is_empty()).await;
    assert_eq!(*log.lock().unwrap(), vec!["V9=9"]);
    assert!(h.observer.warnings().iter().any(|w| w.contains("malformed")));
}

#[tokio::test]
async fn test_handler_can_write_back_through_client() {
    // Arrange
    let h = harness();
    let mut server = connected(&h).await;
    let client = Arc::downgrade(&h.client);
    h.client.on_data(
        "V100",
        async_handler_fn(move |_| {
            let client = client.clone();
            async move {
                if let Some(client) = client.upgrade() {
                    client.write("V1", 5).await?;
                }
                Ok::<_, anyhow::Error>(())
            }
        }),
    );
    h.client.start();

    // Act
    server.push(r#"{"code":1,"pin":"V100","value":1}"#);

    // Assert
    let echoed = next_frame(&mut server).await;
    assert_eq!(echoed, Envelope::write_pin("V1", 5));
}

// ── Reads ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_read_is_resolved_by_matching_id() {
    // Arrange
    let h = harness();
    let mut server = connected(&h).await;
    h.client.start();

    // Act
    let client = Arc::clone(&h.client);
    let read = tokio::spawn(async move { client.read("V2").await });
    let request = next_frame(&mut server).await;
    let id = request.id.expect("read carries a request id");
    server.push(r#"{"code":1,"pin":"V2","value":"push, not an answer"}"#);
    server.push(&format!(r#"{{"code":0,"pin":"V2","value":33,"id":{id}}}"#));

    // Assert
    assert_eq!(request.pin.as_deref(), Some("V2"));
    let value = read.await.unwrap().unwrap();
    assert_eq!(value, Some(PinValue::Int(33)));
}

#[tokio::test]
async fn test_read_without_loop_pumps_frames_itself() {
    // Arrange – no receive loop; the answer carries no id
    let h = harness();
    let mut server = connected(&h).await;
    let log = Arc::new(Mutex::new(Vec::new()));
    h.client.on_data("V7", recorder(&log, "V7"));

    // Act
    let client = Arc::clone(&h.client);
    let read = tokio::spawn(async move { client.read("V4").await });
    next_frame(&mut server).await;
    server.push(r#"{"code":1,"pin":"V7","value":1}"#);
    server.push(r#"{"code":0,"pin":"V4","value":2.5}"#);

    // Assert
    assert_eq!(read.await.unwrap().unwrap(), Some(PinValue::Float(2.5)));
    assert_eq!(*log.lock().unwrap(), vec!["V7=1"], "frames seen while pumping are dispatched");
}

#[tokio::test]
async fn test_read_times_out_with_none() {
    // Arrange
    let h = harness_with(ClientConfig {
        read_timeout_ms: 30,
        ..ClientConfig::new("abc")
    });
    let _server = connected(&h).await;
    h.client.start();

    // Act
    let value = h.client.read("V1").await;

    // Assert
    assert_eq!(assert_ok!(value), None);
    assert!(h.observer.warnings().iter().any(|w| w.contains("no answer")));
}

#[tokio::test]
async fn test_read_returns_none_when_connection_drops() {
    // Arrange
    let h = harness();
    let mut server = connected(&h).await;
    h.client.start();
    let client = Arc::clone(&h.client);
    let read = tokio::spawn(async move { client.read("V1").await });
    next_frame(&mut server).await;

    // Act
    h.client.disconnect().await;

    // Assert
    assert_eq!(read.await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn test_read_from_handler_is_answered_while_loop_runs() {
    // Arrange – the V5 handler reads V6 from inside the receive loop
    let h = harness();
    let mut server = connected(&h).await;
    let answers = Arc::new(Mutex::new(Vec::new()));
    let client = Arc::downgrade(&h.client);
    let seen = Arc::clone(&answers);
    h.client.on_data(
        "V5",
        async_handler_fn(move |_| {
            let client = client.clone();
            let seen = Arc::clone(&seen);
            async move {
                if let Some(client) = client.upgrade() {
                    let value = client.read("V6").await?;
                    seen.lock().unwrap().push(value);
                }
                Ok::<_, anyhow::Error>(())
            }
        }),
    );
    h.client.start();

    // Act
    server.push(r#"{"code":1,"pin":"V5","value":1}"#);
    let request = next_frame(&mut server).await;
    let id = request.id.expect("read carries a request id");
    server.push(&format!(r#"{{"code":0,"pin":"V6","value":9,"id":{id}}}"#));

    // Assert
    assert_eq!(request.pin.as_deref(), Some("V6"));
    eventually("handler read answer", || !answers.lock().unwrap().is_empty()).await;
    assert_eq!(*answers.lock().unwrap(), vec![Some(PinValue::Int(9))]);
    assert!(h.client.receive_loop_active());
}

// ── Supervision ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_twice_keeps_one_loop() {
    let h = harness();
    let _server = connected(&h).await;

    assert!(h.client.start());
    assert!(!h.client.start());
}

#[tokio::test]
async fn test_run_reconnects_after_remote_close() {
    // Arrange
    let h = harness();
    let supervisor = {
        let client = Arc::clone(&h.client);
        tokio::spawn(async move { client.run().await })
    };
    let first = h.connector.accept().await;
    eventually("receive loop", || h.client.receive_loop_active()).await;

    // Act
    first.close();
    let _second = h.connector.accept().await;

    // Assert
    let client = Arc::clone(&h.client);
    eventually("reconnected", move || client.connected()).await;
    assert_eq!(h.connector.open_count(), 2);

    h.client.shutdown().await;
    tokio::time::timeout(WAIT, supervisor).await.unwrap().unwrap();
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_run_retries_failed_connect_after_delay() {
    // Arrange
    let h = harness();
    h.connector.set_fail_connect(true);
    let supervisor = {
        let client = Arc::clone(&h.client);
        tokio::spawn(async move { client.run().await })
    };
    let observer = Arc::clone(&h.observer);
    eventually("first failure", move || !observer.warnings().is_empty()).await;
    assert!(h
        .observer
        .transitions()
        .contains(&(ConnectionState::Connecting, ConnectionState::Authenticating)));

    // Act
    h.connector.set_fail_connect(false);
    let _server = h.connector.accept().await;

    // Assert
    let client = Arc::clone(&h.client);
    eventually("connected", move || client.connected()).await;
    h.client.shutdown().await;
    tokio::time::timeout(WAIT, supervisor).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_second_run_does_not_start_another_supervisor() {
    // Arrange
    let h = harness();
    let first = {
        let client = Arc::clone(&h.client);
        tokio::spawn(async move { client.run().await })
    };
    let _server = h.connector.accept().await;

    // Act
    let second = {
        let client = Arc::clone(&h.client);
        tokio::spawn(async move { client.run().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Assert
    assert_eq!(h.connector.open_count(), 1);
    assert!(h
        .observer
        .warnings()
        .iter()
        .any(|w| w.contains("already running")));

    h.client.shutdown().await;
    tokio::time::timeout(WAIT, first).await.unwrap().unwrap();
    tokio::time::timeout(WAIT, second).await.unwrap().unwrap();
}
