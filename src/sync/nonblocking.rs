//! Spin-locked FIFO whose operations never park the caller.

use spin::Mutex;
use std::collections::VecDeque;

/// FIFO queue with an immediate-answer `pop`.
///
/// The critical sections are a handful of instructions, so a spin lock keeps
/// callers from ever being descheduled by the queue itself.
pub struct NonBlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> NonBlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Append `value` to the tail.
    pub fn push(&self, value: T) {
        self.items.lock().push_back(value);
    }

    /// Remove the head value, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Keep only the values `keep` accepts, preserving their order.
    pub fn retain<F: FnMut(&T) -> bool>(&self, keep: F) {
        self.items.lock().retain(keep);
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

impl<T> Default for NonBlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_basic() {
        let queue = NonBlockingQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);

        queue.push(42u32);
        assert!(!queue.is_empty());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pop(), Some(42));
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_pop_empty_returns_immediately() {
        let queue: NonBlockingQueue<u32> = NonBlockingQueue::new();
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_retain_drops_matching_values_in_order() {
        let queue = NonBlockingQueue::new();
        for value in [1u32, 2, 3, 2, 4] {
            queue.push(value);
        }
        queue.retain(|&value| value != 2);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(4));
    }
}
