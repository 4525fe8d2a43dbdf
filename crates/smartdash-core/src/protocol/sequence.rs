//! Thread-safe counter for request ids.
//!
//! # Why request ids? (for beginners)
//!
//! A device receives two kinds of inbound traffic on the same socket:
//! answers to its own questions (`READ_PIN`, `GET_PROPERTY`) and unsolicited
//! pushes from the dashboard.  Tagging every question with a fresh id lets
//! the receive path recognise the answer when the server echoes the id back,
//! instead of guessing that "the next message" is the answer.
//!
//! The counter is an `AtomicU64`, so any task may draw ids without a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing source of request ids.
///
/// Ids start at 1; 0 is never handed out, so servers that send `"id":0` as a
/// placeholder can never be mistaken for an answer.  The counter skips 0 when
/// it wraps at `u64::MAX`.
///
/// # Examples
///
/// ```rust
/// use smartdash_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a new counter whose first id is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next request id.
    ///
    /// `Ordering::Relaxed` is enough: ids only need to be unique, they do not
    /// publish any other memory.
    pub fn next(&self) -> u64 {
        loop {
            let id = self.inner.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// Returns the id the next call to [`next`](Self::next) will try to hand out.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
