//! Callback registry and inbound dispatcher.
//!
//! Handlers are attached to virtual pins during setup and invoked for every
//! inbound envelope addressed to that pin.
//!
//! # Ordering
//!
//! All handlers for a pin run **in registration order**, and each one,
//! synchronous or asynchronous, finishes before the next starts.  Inbound
//! envelopes are dispatched one at a time by the receive loop, so a slow
//! handler delays everything behind it; handlers that need to do long work
//! should spawn it.
//!
//! # Fault isolation
//!
//! A handler that returns an error or panics is reported to the
//! [`Observer`] and skipped.  The remaining handlers and the receive loop keep
//! going.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::FutureExt;
use smartdash_core::{decode_frame, Envelope, MessageCode, PinValue};
use tracing::debug;

use crate::application::observer::Observer;
use crate::application::pending::PendingRequests;

/// Something that consumes values pushed to a virtual pin.
///
/// Implement this directly for stateful handlers, or wrap a closure with
/// [`handler_fn`] / [`async_handler_fn`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PinHandler: Send + Sync {
    /// Handles one value.  An `Err` is reported and does not stop dispatch.
    async fn handle(&self, value: PinValue) -> anyhow::Result<()>;
}

/// Adapter for synchronous closures.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> PinHandler for FnHandler<F>
where
    F: Fn(PinValue) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, value: PinValue) -> anyhow::Result<()> {
        (self.0)(value)
    }
}

/// Wraps a blocking closure as a [`PinHandler`].
///
/// ```rust
/// use smartdash_client::application::dispatch::handler_fn;
///
/// let handler = handler_fn(|value| {
///     println!("V3 is now {value}");
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(PinValue) -> anyhow::Result<()> + Send + Sync,
{
    FnHandler(f)
}

/// Adapter for closures returning a future.
pub struct AsyncFnHandler<F>(F);

#[async_trait]
impl<F, Fut> PinHandler for AsyncFnHandler<F>
where
    F: Fn(PinValue) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, value: PinValue) -> anyhow::Result<()> {
        (self.0)(value).await
    }
}

/// Wraps an async closure as a [`PinHandler`].  The returned future is
/// awaited to completion before the next handler for the same pin runs.
pub fn async_handler_fn<F, Fut>(f: F) -> AsyncFnHandler<F>
where
    F: Fn(PinValue) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    AsyncFnHandler(f)
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Pin → ordered handler list.  Handlers are only ever appended.
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: HashMap<String, Vec<Arc<dyn PinHandler>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `pin` (fan-out, never replace).
    pub fn register(&mut self, pin: impl Into<String>, handler: Arc<dyn PinHandler>) {
        self.handlers.entry(pin.into()).or_default().push(handler);
    }

    /// Snapshot of the handlers for `pin`, in registration order.
    pub fn handlers_for(&self, pin: &str) -> Vec<Arc<dyn PinHandler>> {
        self.handlers.get(pin).cloned().unwrap_or_default()
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// What happened to one inbound envelope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// The envelope answered an outstanding request.
    pub resolved_request: bool,
    /// Handlers that completed successfully.
    pub handlers_ok: usize,
    /// Handlers that returned an error or panicked.
    pub handlers_failed: usize,
}

/// Routes decoded envelopes to pending requests and pin handlers.
pub struct Dispatcher {
    registry: RwLock<CallbackRegistry>,
    pending: PendingRequests,
    observer: Arc<dyn Observer>,
}

impl Dispatcher {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self {
            registry: RwLock::new(CallbackRegistry::new()),
            pending: PendingRequests::new(),
            observer,
        }
    }

    pub fn register(&self, pin: impl Into<String>, handler: Arc<dyn PinHandler>) {
        self.registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .register(pin, handler);
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Decodes one inbound frame and dispatches every envelope in it, in
    /// wire order.  Undecodable frames and elements are reported and
    /// skipped.
    pub async fn dispatch_frame(&self, text: &str) -> Vec<DispatchReport> {
        let items = match decode_frame(text) {
            Ok(frame) => frame.into_items(),
            Err(e) => {
                self.report_bad_frame(&e);
                return Vec::new();
            }
        };

        let mut reports = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Ok(envelope) => reports.push(self.dispatch(envelope).await),
                Err(e) => self.report_bad_frame(&e),
            }
        }
        reports
    }

    /// Dispatches a single envelope.
    pub async fn dispatch(&self, envelope: Envelope) -> DispatchReport {
        let mut report = DispatchReport::default();

        if envelope.code == MessageCode::Error {
            self.observer.remote_error(&envelope.value_or_default());
        }

        if self.pending.resolve(&envelope) {
            debug!("envelope answered request {:?}", envelope.id);
            report.resolved_request = true;
            return report;
        }

        let Some(pin) = envelope.pin.as_deref() else {
            return report;
        };

        // Clone the handler list out so no lock is held while handlers run;
        // handlers are free to register more handlers or call back into the
        // client.
        let handlers = self
            .registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .handlers_for(pin);
        if handlers.is_empty() {
            debug!("no handlers for pin {pin}");
            return report;
        }

        let value = envelope.value_or_default();
        for (index, handler) in handlers.iter().enumerate() {
            let outcome = AssertUnwindSafe(handler.handle(value.clone()))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => report.handlers_ok += 1,
                Ok(Err(e)) => {
                    report.handlers_failed += 1;
                    self.observer
                        .error(&format!("handler #{index} for pin {pin} failed: {e:#}"));
                }
                Err(panic) => {
                    report.handlers_failed += 1;
                    self.observer.error(&format!(
                        "handler #{index} for pin {pin} panicked: {}",
                        panic_message(panic.as_ref())
                    ));
                }
            }
        }
        report
    }

    fn report_bad_frame(&self, error: &smartdash_core::ProtocolError) {
        if error.is_malformed() {
            self.observer
                .warn(&format!("discarding malformed inbound frame: {error}"));
        } else {
            self.observer
                .warn(&format!("ignoring envelope this client does not understand: {error}"));
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::observer::mock::{ObservedEvent, RecordingObserver};
    use mockall::Sequence;
    use std::sync::Mutex;

    fn recorder() -> Arc<RecordingObserver> {
        Arc::new(RecordingObserver::new())
    }

    /// Handler that appends `tag` to a shared log.
    fn tagging(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Arc<dyn PinHandler> {
        let log = Arc::clone(log);
        Arc::new(handler_fn(move |value| {
            log.lock().unwrap().push(format!("{tag}:{value}"));
            Ok(())
        }))
    }

    #[tokio::test]
    async fn test_handlers_run_once_each_in_registration_order() {
        // Arrange
        let dispatcher = Dispatcher::new(recorder());
        let mut seq = Sequence::new();
        let mut first = MockPinHandler::new();
        first
            .expect_handle()
            .withf(|v| *v == PinValue::Int(7))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let mut second = MockPinHandler::new();
        second
            .expect_handle()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        dispatcher.register("V1", Arc::new(first));
        dispatcher.register("V1", Arc::new(second));

        // Act
        let report = dispatcher.dispatch(Envelope::write_pin("V1", 7)).await;

        // Assert – mockall verifies call count and order on drop
        assert_eq!(report.handlers_ok, 2);
        assert_eq!(report.handlers_failed, 0);
    }

    #[tokio::test]
    async fn test_async_handler_completes_before_next_handler() {
        // Arrange
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(recorder());
        let slow_log = Arc::clone(&log);
        dispatcher.register(
            "V2",
            Arc::new(async_handler_fn(move |_| {
                let log = Arc::clone(&slow_log);
                async move {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    log.lock().unwrap().push("slow".to_string());
                    Ok::<_, anyhow::Error>(())
                }
            })),
        );
        dispatcher.register("V2", tagging(&log, "fast"));

        // Act
        dispatcher.dispatch(Envelope::write_pin("V2", 1)).await;

        // Assert
        assert_eq!(*log.lock().unwrap(), vec!["slow", "fast:1"]);
    }

    #[tokio::test]
    async fn test_unregistered_pin_is_noop() {
        let observer = recorder();
        let dispatcher = Dispatcher::new(observer.clone());

        let report = dispatcher.dispatch(Envelope::write_pin("V99", 1)).await;

        assert_eq!(report, DispatchReport::default());
        assert!(observer.errors().is_empty());
    }

    #[tokio::test]
    async fn test_missing_value_is_delivered_as_default() {
        let mut handler = MockPinHandler::new();
        handler
            .expect_handle()
            .withf(|v| *v == PinValue::default())
            .times(1)
            .returning(|_| Ok(()));
        let dispatcher = Dispatcher::new(recorder());
        dispatcher.register("V5", Arc::new(handler));

        let env = Envelope::new(MessageCode::WritePin).with_pin("V5");
        dispatcher.dispatch(env).await;
    }

    #[tokio::test]
    async fn test_error_code_is_reported_and_invokes_no_handler() {
        // Arrange
        let observer = recorder();
        let dispatcher = Dispatcher::new(observer.clone());
        let mut handler = MockPinHandler::new();
        handler.expect_handle().times(0);
        dispatcher.register("V1", Arc::new(handler));

        // Act
        let reports = dispatcher
            .dispatch_frame(r#"{"code":8,"value":"bad pin"}"#)
            .await;

        // Assert
        assert_eq!(reports.len(), 1);
        assert!(observer
            .events()
            .contains(&ObservedEvent::RemoteError(PinValue::from("bad pin"))));
    }

    #[tokio::test]
    async fn test_failing_and_panicking_handlers_do_not_stop_others() {
        // Arrange
        let observer = recorder();
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(observer.clone());
        dispatcher.register(
            "V1",
            Arc::new(handler_fn(|_| Err(anyhow::anyhow!("sensor offline")))),
        );
        dispatcher.register("V1", Arc::new(handler_fn(|_| panic!("boom"))));
        dispatcher.register("V1", tagging(&log, "survivor"));

        // Act
        let report = dispatcher.dispatch(Envelope::write_pin("V1", 3)).await;

        // Assert
        assert_eq!(report.handlers_ok, 1);
        assert_eq!(report.handlers_failed, 2);
        assert_eq!(*log.lock().unwrap(), vec!["survivor:3"]);
        let errors = observer.errors();
        assert!(errors.iter().any(|e| e.contains("sensor offline")));
        assert!(errors.iter().any(|e| e.contains("boom")));
    }

    #[tokio::test]
    async fn test_batch_dispatches_each_element_in_order() {
        // Arrange
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(recorder());
        dispatcher.register("A", tagging(&log, "A"));
        dispatcher.register("B", tagging(&log, "B"));
        dispatcher.register("C", tagging(&log, "C"));

        // Act
        let reports = dispatcher
            .dispatch_frame(
                r#"[{"code":1,"pin":"A","value":1},{"code":1,"pin":"B","value":2},{"code":1,"pin":"C","value":3}]"#,
            )
            .await;

        // Assert
        assert_eq!(reports.len(), 3);
        assert_eq!(*log.lock().unwrap(), vec!["A:1", "B:2", "C:3"]);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_reported_not_fatal() {
        let observer = recorder();
        let dispatcher = Dispatcher::new(observer.clone());

        let reports = dispatcher.dispatch_frame("{not json").await;

        assert!(reports.is_empty());
        assert!(observer
            .warnings()
            .iter()
            .any(|w| w.contains("malformed")));
    }

    #[tokio::test]
    async fn test_read_answer_resolves_waiter_instead_of_handlers() {
        // Arrange
        let dispatcher = Dispatcher::new(recorder());
        let mut handler = MockPinHandler::new();
        handler.expect_handle().times(0);
        dispatcher.register("V1", Arc::new(handler));
        let rx = dispatcher.pending().register(5, MessageCode::ReadPin, "V1");

        // Act
        let report = dispatcher
            .dispatch_frame(r#"{"code":0,"pin":"V1","value":12,"id":5}"#)
            .await;

        // Assert
        assert!(report[0].resolved_request);
        assert_eq!(rx.await.unwrap(), Some(PinValue::Int(12)));
    }

    #[test]
    fn test_registry_fans_out_rather_than_replacing() {
        let mut registry = CallbackRegistry::new();
        registry.register("V1", Arc::new(handler_fn(|_| Ok(()))));
        registry.register("V1", Arc::new(handler_fn(|_| Ok(()))));
        assert_eq!(registry.handlers_for("V1").len(), 2);
        assert!(registry.handlers_for("V2").is_empty());
    }
}
