//! Thread-safe FIFO buffer between driver callbacks and the polling consumer.
//!
//! Driver callbacks push from OS-owned threads; the host drains from its own
//! loop (typically once per rendered frame). A single mutex guards the whole
//! queue; it is held only for the push or pop itself, so the callback never
//! blocks for more than a bounded, short duration.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::midi::ShortMessage;

/// Unbounded FIFO of incoming short messages.
///
/// No upper bound is enforced: a producer running with no consumer grows the
/// queue without limit. Accepted trade-off for a polling design.
#[derive(Debug, Default)]
pub struct MessageQueue {
    inner: Mutex<VecDeque<ShortMessage>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Callable from any thread.
    pub fn push(&self, msg: ShortMessage) {
        self.inner.lock().push_back(msg);
    }

    /// Remove and return the oldest message, or None if the queue is empty.
    pub fn try_pop(&self) -> Option<ShortMessage> {
        self.inner.lock().pop_front()
    }

    /// Number of buffered messages. Advisory: may be stale by the time the
    /// caller acts on it.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
