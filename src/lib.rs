#![forbid(unsafe_code)]
#![warn(unreachable_pub)]

//! User-space simulator of a preemptive multitasking kernel.
//!
//! A fixed-size process table is scheduled round-robin across a pool of
//! worker threads. Each worker takes a ready process, runs one quantum of it
//! through a pluggable execution engine, and re-files it as ready, blocked or
//! terminated. External events unblock processes; `kill` and `wait` observe
//! and mutate the table from any thread.
//!
//! # Quick Start
//!
//! ```no_run
//! use preemptive_sim::{Kernel, KernelConfig, Program, ProgramEvaluator};
//!
//! let kernel = Kernel::launch(KernelConfig::new(2, 16), ProgramEvaluator::new())
//!     .expect("failed to start kernel");
//!
//! let pid = kernel.create_process(Program::Bursts(3)).expect("table full");
//! kernel.wait(pid).expect("invalid pid");
//! kernel.stop();
//! ```
//!
//! # Architecture
//!
//! - [`sync`]: blocking and non-blocking FIFO queues
//! - [`process`]: process control blocks and the process table
//! - [`engine`]: the execution-engine seam and a reference engine
//! - [`sched`]: the worker dispatch loop
//! - [`kernel`]: worker-pool ownership and the lifecycle API
//! - [`time`]: periodic event source
//! - [`workload`]: batch workload driver

// Core modules
pub mod config;
pub mod engine;
pub mod errors;
pub mod kernel;
pub mod process;
pub mod sched;
pub mod sync;
pub mod time;
pub mod workload;

#[cfg(test)]
mod tests;

// ============================================================================
// Public API
// ============================================================================

// Kernel
pub use kernel::{Kernel, KernelHandle, TableSnapshot};

// Configuration
pub use config::{BlockedPolicy, KernelConfig, StopPolicy};

// Processes
pub use process::{ProcessId, ProcessInfo, ProcessState, ProcessTable, ProgramCounter};

// Execution engine
pub use engine::{Evaluator, Program, ProgramEvaluator, Quantum, StopReason};

// Queues
pub use sync::{BlockingQueue, NonBlockingQueue};

// Scheduling
pub use sched::StatsSnapshot;

// Time
pub use time::EventSource;

// Workload
pub use workload::{Workload, WorkloadReport};

// Errors
pub use errors::{CreateError, KernelError, KernelResult, LifecycleError, ProcessError, QueueError};
