//! Worker-pool scheduling.
//!
//! [`rr`] holds the round-robin dispatch loop every worker thread runs; this
//! module holds the counters the loop and the lifecycle API maintain.

pub mod rr;

use portable_atomic::{AtomicU64, Ordering};

/// Scheduler event counters. Updated with relaxed atomics; read through
/// [`SchedulerStats::snapshot`].
#[derive(Debug, Default)]
pub struct SchedulerStats {
    dispatched: AtomicU64,
    expired: AtomicU64,
    blocked: AtomicU64,
    terminated: AtomicU64,
    killed: AtomicU64,
    events: AtomicU64,
    promoted: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Quanta handed to workers.
    pub dispatched: u64,
    /// Quanta that ended with the process re-queued as ready.
    pub expired: u64,
    /// Quanta that ended with the process blocked.
    pub blocked: u64,
    /// Processes the engine reported finished.
    pub terminated: u64,
    /// Processes terminated by `kill`.
    pub killed: u64,
    /// Calls to the event hook.
    pub events: u64,
    /// Event calls that actually promoted a blocked process.
    pub promoted: u64,
    /// Quantum results dropped because the process was killed mid-quantum.
    pub discarded: u64,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_terminated(&self) {
        self.terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_kill(&self) {
        self.killed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event(&self, promoted: bool) {
        self.events.fetch_add(1, Ordering::Relaxed);
        if promoted {
            self.promoted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            killed: self.killed.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            promoted: self.promoted.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
