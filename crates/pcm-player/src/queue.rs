//! Thread-safe FIFO of pending playback items.
//!
//! Any number of producers call [`PlaybackQueue::enqueue`]; exactly one playback thread
//! consumes. The lock is held only to splice an item in or out, never across decoding
//! or device writes.
//!
//! The API makes shutdown deterministic: `close()` wakes every waiter, blocked dequeues
//! return the remaining items and then `None`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A request to play one resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlaybackItem {
    pub resource_id: String,
}

impl PlaybackItem {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
        }
    }
}

/// FIFO of [`PlaybackItem`]s guarded by a single mutex.
///
/// A `closed` flag lives under the same mutex as the items so close and dequeue
/// cannot race.
pub struct PlaybackQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

struct QueueInner {
    items: VecDeque<PlaybackItem>,
    closed: bool,
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item` at the rear and wake the consumer.
    ///
    /// Returns `false` (dropping the item) if the queue has been closed.
    pub fn enqueue(&self, item: PlaybackItem) -> bool {
        let mut g = self.lock();
        if g.closed {
            drop(g);
            tracing::warn!(item = %item.resource_id, "queue closed; item dropped");
            return false;
        }
        g.items.push_back(item);
        drop(g);
        self.cv.notify_one();
        true
    }

    /// Remove and return the front item without waiting.
    pub fn try_dequeue(&self) -> Option<PlaybackItem> {
        self.lock().items.pop_front()
    }

    /// Wait for the front item.
    ///
    /// Returns `None` only once the queue is closed and empty.
    pub fn dequeue_blocking(&self) -> Option<PlaybackItem> {
        let mut g = self.lock();
        loop {
            if let Some(item) = g.items.pop_front() {
                return Some(item);
            }
            if g.closed {
                return None;
            }
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wait up to `timeout` for the front item.
    ///
    /// Returns `None` on timeout or when the queue is closed and empty.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<PlaybackItem> {
        let deadline = Instant::now() + timeout;
        let mut g = self.lock();
        loop {
            if let Some(item) = g.items.pop_front() {
                return Some(item);
            }
            if g.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            g = ng;
        }
    }

    /// Current number of pending items (best-effort snapshot).
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Discard every pending item, returning how many were dropped.
    pub fn drain_all(&self) -> usize {
        let mut g = self.lock();
        let dropped = g.items.len();
        g.items.clear();
        dropped
    }

    /// Refuse further items and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut g = self.lock();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
