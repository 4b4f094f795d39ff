//! Mutex + condition variable guarded FIFO with cooperative shutdown.

use crate::errors::QueueError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// FIFO queue whose `pop` waits for a value.
///
/// Once [`terminate`](Self::terminate) has been called the queue never blocks
/// a popper again: every pending and future `pop` returns
/// [`QueueError::Terminated`], even if values are still stored.
pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

struct Inner<T> {
    items: VecDeque<T>,
    terminated: bool,
}

impl<T> BlockingQueue<T> {
    /// Create an empty, live queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                terminated: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append `value` to the tail and wake one waiting popper.
    pub fn push(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.items.push_back(value);
        self.available.notify_one();
    }

    /// Remove the head value, waiting while the queue is empty.
    ///
    /// # Returns
    ///
    /// The head value, or `Err(QueueError::Terminated)` if the queue is (or
    /// becomes, while waiting) terminated.
    pub fn pop(&self) -> Result<T, QueueError> {
        let mut inner = self.inner.lock();
        while inner.items.is_empty() && !inner.terminated {
            self.available.wait(&mut inner);
        }
        if inner.terminated {
            return Err(QueueError::Terminated);
        }
        inner.items.pop_front().ok_or(QueueError::Terminated)
    }

    /// Like [`pop`](Self::pop), but gives up after `timeout`.
    ///
    /// `Ok(None)` means the timeout elapsed with the queue still empty.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<T>, QueueError> {
        let mut inner = self.inner.lock();
        if inner.items.is_empty() && !inner.terminated {
            // Spurious wakeups just shorten the wait; the checks below decide.
            self.available.wait_for(&mut inner, timeout);
        }
        if inner.terminated {
            return Err(QueueError::Terminated);
        }
        Ok(inner.items.pop_front())
    }

    /// Point-in-time emptiness check.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Point-in-time length.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Shut the queue down and wake every waiter. Idempotent.
    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        inner.terminated = true;
        // Broadcast: each parked popper must observe termination.
        self.available.notify_all();
    }

    /// Whether [`terminate`](Self::terminate) has been called.
    pub fn is_terminated(&self) -> bool {
        self.inner.lock().terminated
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
