//! Kernel configuration.

use crate::errors::LifecycleError;
use std::time::Duration;

/// What a worker does when both the ready and blocked queues are empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPolicy {
    /// Park and retry until the kernel is stopped.
    #[default]
    RunUntilStopped,
    /// Exit the dispatch loop. Seed the table before starting the workers.
    DrainAndExit,
}

/// What a worker does when the ready queue is empty but processes are blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockedPolicy {
    /// Wait for an event to promote a blocked process.
    #[default]
    IdleWaitForEvent,
    /// Run the oldest blocked process anyway, without an event.
    RunBlockedAsFallback,
}

/// Parameters fixed for the lifetime of a kernel.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    workers: usize,
    capacity: usize,
    stop_policy: StopPolicy,
    blocked_policy: BlockedPolicy,
    idle_poll: Duration,
}

impl KernelConfig {
    /// `workers` dispatch threads over a table of `capacity` slots.
    pub fn new(workers: usize, capacity: usize) -> Self {
        Self {
            workers,
            capacity,
            stop_policy: StopPolicy::default(),
            blocked_policy: BlockedPolicy::default(),
            idle_poll: Duration::from_millis(1),
        }
    }

    pub fn stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }

    pub fn blocked_policy(mut self, policy: BlockedPolicy) -> Self {
        self.blocked_policy = policy;
        self
    }

    /// Longest an idle worker parks before re-checking the queues.
    pub fn idle_poll(mut self, interval: Duration) -> Self {
        self.idle_poll = interval;
        self
    }

    pub fn get_workers(&self) -> usize {
        self.workers
    }

    pub fn get_capacity(&self) -> usize {
        self.capacity
    }

    pub fn get_stop_policy(&self) -> StopPolicy {
        self.stop_policy
    }

    pub fn get_blocked_policy(&self) -> BlockedPolicy {
        self.blocked_policy
    }

    pub fn get_idle_poll(&self) -> Duration {
        self.idle_poll
    }

    /// Reject settings that cannot run: no workers, no slots, more slots
    /// than pids, or a zero idle poll that would spin on the table lock.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.workers == 0 {
            return Err(LifecycleError::InvalidConfig("worker count must be at least 1"));
        }
        if self.capacity == 0 {
            return Err(LifecycleError::InvalidConfig("process table capacity must be at least 1"));
        }
        if u32::try_from(self.capacity).is_err() {
            return Err(LifecycleError::InvalidConfig("process table capacity exceeds the pid space"));
        }
        if self.idle_poll.is_zero() {
            return Err(LifecycleError::InvalidConfig("idle poll interval must be non-zero"));
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new(2, 64)
    }
}
