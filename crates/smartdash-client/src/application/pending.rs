//! Correlation table for outstanding requests.
//!
//! `read` and `get_property` register a one-shot waiter under a fresh request
//! id before sending.  The dispatcher hands every inbound envelope to
//! [`PendingRequests::resolve`] first; a match completes the waiter and the
//! envelope is not dispatched to pin handlers.
//!
//! Servers that do not echo ids are still supported: an id-less `READ_PIN`
//! or `GET_PROPERTY` answer resolves the *oldest* outstanding request for the
//! same code and pin.

use std::collections::BTreeMap;
use std::sync::Mutex;

use smartdash_core::{Envelope, MessageCode, PinValue};
use tokio::sync::oneshot;

/// Value delivered to a waiter: `None` when the answer carried no value or
/// the request was abandoned (disconnect).
pub type Answer = Option<PinValue>;

struct PendingEntry {
    code: MessageCode,
    pin: String,
    tx: oneshot::Sender<Answer>,
}

/// Outstanding requests keyed by request id.
///
/// A `BTreeMap` keeps ids ordered, so "oldest request for this pin" is the
/// first match in iteration order.
#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<BTreeMap<u64, PendingEntry>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for request `id`.
    pub fn register(
        &self,
        id: u64,
        code: MessageCode,
        pin: impl Into<String>,
    ) -> oneshot::Receiver<Answer> {
        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry {
            code,
            pin: pin.into(),
            tx,
        };
        self.lock().insert(id, entry);
        rx
    }

    /// Completes the waiter this envelope answers, if any.
    ///
    /// Returns `true` when a waiter was completed.
    pub fn resolve(&self, envelope: &Envelope) -> bool {
        if !envelope.code.is_response() {
            return false;
        }

        let mut table = self.lock();
        let key = match envelope.id {
            Some(id) => table.contains_key(&id).then_some(id),
            None => envelope.pin.as_deref().and_then(|pin| {
                table
                    .iter()
                    .find(|(_, e)| e.code == envelope.code && e.pin == pin)
                    .map(|(id, _)| *id)
            }),
        };

        match key.and_then(|id| table.remove(&id)) {
            Some(entry) => {
                // The waiter may have timed out and dropped its receiver.
                let _ = entry.tx.send(envelope.value.clone());
                true
            }
            None => false,
        }
    }

    /// Forgets request `id` (timeout or send failure).
    pub fn cancel(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Completes every waiter with `None`.  Used when the connection drops.
    pub fn fail_all(&self) {
        let drained = std::mem::take(&mut *self.lock());
        for (_, entry) in drained {
            let _ = entry.tx.send(None);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, PendingEntry>> {
        // Poisoning is ignored: every critical section leaves the map consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
