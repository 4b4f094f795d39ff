//! Thread-safe FIFO queues.
//!
//! Two variants share the same storage discipline: [`BlockingQueue`] parks
//! poppers until a value arrives or the queue is terminated, while
//! [`NonBlockingQueue`] answers immediately and never suspends its callers.

pub mod blocking;
pub mod nonblocking;

pub use blocking::BlockingQueue;
pub use nonblocking::NonBlockingQueue;
