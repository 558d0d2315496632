//! Mutex/condvar bounded-by-memory FIFO queue.
//!
//! The blocking baseline the lock-free structures are measured against in
//! `pool_bench`. Not part of the fast path anywhere: [`wait_and_pop`] takes
//! a lock and may sleep.
//!
//! [`wait_and_pop`]: BlockingQueue::wait_and_pop

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded FIFO queue guarded by a mutex, with a condvar for consumers.
///
/// [`close`](BlockingQueue::close) wakes every sleeping consumer; once the
/// queue is closed and drained, [`wait_and_pop`](BlockingQueue::wait_and_pop)
/// returns `None`.
pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
}

impl<T> BlockingQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Appends an item and wakes one waiting consumer.
    ///
    /// Returns `false` if the queue has been closed; the item is dropped in
    /// that case.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        inner.items.push_back(item);
        drop(inner);

        self.ready.notify_one();
        true
    }

    /// Blocks until an item is available or the queue is closed and empty.
    ///
    /// Items still queued at close time are drained before `None` is
    /// returned.
    pub fn wait_and_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Closes the queue and wakes every waiting consumer.
    ///
    /// Idempotent. Pushes after close are rejected.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);

        self.ready.notify_all();
    }

    /// Number of queued items at the time of the call.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
