//! Error handling for the simulated kernel.
//!
//! Every fallible operation returns one of the narrow error enums below; the
//! top-level [`KernelError`] wraps them so callers that do not care about the
//! category can propagate everything with `?`.

use crate::process::ProcessId;
use std::io;

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Top-level error type for all kernel operations.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Process creation errors
    #[error("process creation error: {0}")]
    Create(#[from] CreateError),
    /// Errors addressing a specific process
    #[error("process error: {0}")]
    Process(#[from] ProcessError),
    /// Queue errors
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    /// Start/stop errors
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Errors that can occur when creating a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CreateError {
    /// Every slot of the process table is allocated.
    ///
    /// Not fatal: the caller decides whether to retry or drop the work.
    #[error("process table is full ({capacity} slots)")]
    TableFull { capacity: usize },
}

/// Errors addressing a process by pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// The pid does not name a slot of the table.
    #[error("pid {pid} is outside the process table (capacity {capacity})")]
    OutOfRange { pid: ProcessId, capacity: usize },
    /// The pid names a slot that no process currently owns.
    #[error("pid {0} is not allocated")]
    Unallocated(ProcessId),
    /// The operation requires a terminated process.
    #[error("pid {0} has not terminated")]
    NotTerminated(ProcessId),
}

/// Errors reported by the synchronized queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue was shut down; no more values will be delivered.
    #[error("queue terminated")]
    Terminated,
}

/// Errors starting or stopping the kernel.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The configuration cannot produce a working kernel.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// `start` was called on a kernel whose workers are already running.
    #[error("kernel already started")]
    AlreadyStarted,
    /// The operating system refused to spawn a thread.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),
    /// `drain` requires workers that exit on their own.
    #[error("drain requires StopPolicy::DrainAndExit")]
    NotDraining,
}

impl KernelError {
    /// True when the error is the non-fatal "table full" condition.
    pub fn is_table_full(&self) -> bool {
        matches!(self, KernelError::Create(CreateError::TableFull { .. }))
    }
}
