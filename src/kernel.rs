//! Kernel abstraction for managing the simulated system.
//!
//! [`Kernel`] owns the worker pool; [`KernelHandle`] is the cloneable public
//! surface (create, kill, wait, event, reap) that drivers, timers and tests
//! use from any thread. The process table and both queues live behind a
//! single mutex shared by every worker.

use crate::config::{KernelConfig, StopPolicy};
use crate::engine::Evaluator;
use crate::errors::{KernelResult, LifecycleError, ProcessError};
use crate::process::{KillOutcome, ProcessId, ProcessInfo, ProcessState, ProcessTable};
use crate::sched::{rr, SchedulerStats, StatsSnapshot};
use crate::sync::NonBlockingQueue;
use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicBool, Ordering};
use std::ops::Deref;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// State shared by the kernel, its handles and its workers.
pub(crate) struct Shared<E: Evaluator> {
    pub(crate) evaluator: E,
    pub(crate) config: KernelConfig,
    pub(crate) table: Mutex<ProcessTable<E::Code>>,
    /// Signalled when a process becomes ready, and on stop.
    pub(crate) work_available: Condvar,
    /// Signalled when a process terminates or a slot is reaped.
    pub(crate) terminated: Condvar,
    active: AtomicBool,
    pub(crate) exits: NonBlockingQueue<ProcessId>,
    pub(crate) stats: SchedulerStats,
}

impl<E: Evaluator> Shared<E> {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Consistent view of both queues and every allocated process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    /// Ready queue, head first.
    pub ready: Vec<ProcessId>,
    /// Blocked queue, oldest first.
    pub blocked: Vec<ProcessId>,
    /// Allocated processes in pid order.
    pub processes: Vec<ProcessInfo>,
}

/// Cloneable handle to a kernel's lifecycle API.
pub struct KernelHandle<E: Evaluator> {
    shared: Arc<Shared<E>>,
}

impl<E: Evaluator> Clone for KernelHandle<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Evaluator> KernelHandle<E> {
    /// Create a process running `code` and queue it as ready.
    ///
    /// The lowest unallocated slot is used, so its pid is the lowest free one.
    ///
    /// # Returns
    ///
    /// The new pid, or `CreateError::TableFull` when every slot is allocated.
    /// A full table is not fatal; the caller decides whether to retry.
    pub fn create_process(&self, code: E::Code) -> KernelResult<ProcessId> {
        let mut table = self.shared.table.lock();
        let pid = table.allocate(code)?;
        info!(pid = %pid, "process created");
        self.shared.work_available.notify_one();
        Ok(pid)
    }

    /// Terminate `pid`.
    ///
    /// A ready or blocked process is pulled from its queue. A process that a
    /// worker is running right now is marked terminated immediately; the
    /// worker's quantum completes and its result is discarded. Killing an
    /// already-terminated process is a no-op.
    pub fn kill(&self, pid: ProcessId) -> KernelResult<()> {
        let mut table = self.shared.table.lock();
        match table.kill(pid)? {
            KillOutcome::Killed { previous } => {
                self.shared.stats.record_kill();
                self.shared.exits.push(pid);
                info!(pid = %pid, previous = %previous, "process killed");
                self.shared.terminated.notify_all();
            }
            KillOutcome::AlreadyTerminated => {
                debug!(pid = %pid, "kill of terminated process ignored");
            }
        }
        Ok(())
    }

    /// Block until `pid` has terminated.
    ///
    /// Also returns if the slot is reaped (or reaped and reallocated) while
    /// waiting: the process that was being waited on is gone either way.
    pub fn wait(&self, pid: ProcessId) -> KernelResult<()> {
        let mut table = self.shared.table.lock();
        let incarnation = table.allocated(pid)?.incarnation;
        while !has_ended(&table, pid, incarnation)? {
            self.shared.terminated.wait(&mut table);
        }
        Ok(())
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`. A timeout too
    /// large to add to the current instant (`Duration::MAX`) never expires.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the process terminated, `Ok(false)` on timeout.
    pub fn wait_timeout(&self, pid: ProcessId, timeout: Duration) -> KernelResult<bool> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait(pid).map(|()| true);
        };
        let mut table = self.shared.table.lock();
        let incarnation = table.allocated(pid)?.incarnation;
        loop {
            if has_ended(&table, pid, incarnation)? {
                return Ok(true);
            }
            if self.shared.terminated.wait_until(&mut table, deadline).timed_out() {
                return Ok(has_ended(&table, pid, incarnation)?);
            }
        }
    }

    /// Event hook: move the oldest blocked process to the ready queue.
    ///
    /// Returns the promoted pid; with nothing blocked this is a no-op.
    pub fn event(&self) -> Option<ProcessId> {
        let mut table = self.shared.table.lock();
        let promoted = table.promote_blocked();
        self.shared.stats.record_event(promoted.is_some());
        if let Some(pid) = promoted {
            debug!(pid = %pid, "blocked -> ready");
            self.shared.work_available.notify_one();
        }
        promoted
    }

    /// Release a terminated process's slot so its pid can be reused.
    ///
    /// An exit-log entry for `pid` that nobody consumed is dropped with it.
    pub fn reap(&self, pid: ProcessId) -> KernelResult<()> {
        let mut table = self.shared.table.lock();
        table.reap(pid)?;
        self.shared.exits.retain(|&logged| logged != pid);
        info!(pid = %pid, "process reaped");
        self.shared.terminated.notify_all();
        Ok(())
    }

    /// Snapshot of one allocated process.
    pub fn process(&self, pid: ProcessId) -> KernelResult<ProcessInfo> {
        Ok(self.shared.table.lock().info(pid)?)
    }

    /// Current state of the slot `pid` names.
    pub fn state(&self, pid: ProcessId) -> KernelResult<ProcessState> {
        Ok(self.shared.table.lock().pcb(pid)?.state())
    }

    pub fn ready_len(&self) -> usize {
        self.shared.table.lock().ready_len()
    }

    pub fn blocked_len(&self) -> usize {
        self.shared.table.lock().blocked_len()
    }

    /// Both queues and all allocated processes, taken under one lock.
    pub fn snapshot(&self) -> TableSnapshot {
        let table = self.shared.table.lock();
        TableSnapshot {
            ready: table.ready().collect(),
            blocked: table.blocked().collect(),
            processes: table
                .iter()
                .filter(|pcb| pcb.state().is_allocated())
                .map(|pcb| pcb.info())
                .collect(),
        }
    }

    /// Next pid from the exit log, without waiting.
    ///
    /// Every transition into `Terminated`, by the engine or by `kill`, is
    /// logged exactly once per incarnation. Entries live until consumed here
    /// or until the slot is reaped, so the log never holds more than
    /// `capacity` pids.
    pub fn try_next_exit(&self) -> Option<ProcessId> {
        self.shared.exits.pop()
    }

    /// Exit-log entries not yet consumed.
    pub fn pending_exits(&self) -> usize {
        self.shared.exits.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.shared.config
    }

    pub fn capacity(&self) -> usize {
        self.shared.config.get_capacity()
    }

    /// Whether the workers have been started and not yet stopped.
    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }
}

fn has_ended<C>(table: &ProcessTable<C>, pid: ProcessId, incarnation: u64) -> Result<bool, ProcessError> {
    let pcb = table.pcb(pid)?;
    Ok(pcb.incarnation != incarnation
        || matches!(pcb.state(), ProcessState::Terminated | ProcessState::Unallocated))
}

/// Main kernel handle that owns the worker pool.
///
/// Dereferences to [`KernelHandle`] for the lifecycle API. Dropping a kernel
/// stops and joins its workers.
///
/// # Type Parameters
///
/// * `E` - Execution engine the workers run quanta through
pub struct Kernel<E: Evaluator> {
    handle: KernelHandle<E>,
    workers: Vec<JoinHandle<()>>,
}

impl<E: Evaluator> Kernel<E> {
    /// Create a kernel with an empty process table and no running workers.
    ///
    /// Processes may be created before [`start`](Self::start); under
    /// [`StopPolicy::DrainAndExit`] that is how the table gets seeded.
    pub fn new(config: KernelConfig, evaluator: E) -> Result<Self, LifecycleError> {
        config.validate()?;
        let shared = Shared {
            evaluator,
            table: Mutex::new(ProcessTable::new(config.get_capacity())),
            config,
            work_available: Condvar::new(),
            terminated: Condvar::new(),
            active: AtomicBool::new(false),
            exits: NonBlockingQueue::new(),
            stats: SchedulerStats::new(),
        };

        Ok(Self {
            handle: KernelHandle {
                shared: Arc::new(shared),
            },
            workers: Vec::new(),
        })
    }

    /// Create a kernel and start its workers.
    pub fn launch(config: KernelConfig, evaluator: E) -> Result<Self, LifecycleError> {
        let mut kernel = Self::new(config, evaluator)?;
        kernel.start()?;
        Ok(kernel)
    }

    /// Spawn the worker pool.
    ///
    /// Failing to spawn any worker is fatal to start-up: workers already
    /// spawned are stopped and joined before the error is returned.
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        if !self.workers.is_empty() {
            return Err(LifecycleError::AlreadyStarted);
        }

        let shared = Arc::clone(&self.handle.shared);
        shared.active.store(true, Ordering::Release);

        for index in 0..shared.config.get_workers() {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("sim-worker-{index}"))
                .spawn(move || rr::run_worker(&worker_shared, index));

            match spawned {
                Ok(worker) => self.workers.push(worker),
                Err(err) => {
                    error!(worker = index, error = %err, "failed to spawn worker");
                    shared.active.store(false, Ordering::Release);
                    self.shutdown();
                    return Err(LifecycleError::Spawn(err));
                }
            }
        }

        info!(
            workers = shared.config.get_workers(),
            capacity = shared.config.get_capacity(),
            "kernel started"
        );
        Ok(())
    }

    /// Clone a handle for use on other threads.
    pub fn handle(&self) -> KernelHandle<E> {
        self.handle.clone()
    }

    /// Stop the workers and join them.
    ///
    /// Workers finish their in-flight quantum before observing the stop; no
    /// quantum is preempted.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Join workers that exit on their own once the queues drain.
    ///
    /// Only valid under [`StopPolicy::DrainAndExit`]; otherwise returns
    /// `LifecycleError::NotDraining` and the kernel is stopped instead.
    pub fn drain(mut self) -> Result<(), LifecycleError> {
        if self.handle.config().get_stop_policy() != StopPolicy::DrainAndExit {
            return Err(LifecycleError::NotDraining);
        }
        self.join_workers();
        self.handle.shared.active.store(false, Ordering::Release);
        info!("kernel drained");
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        let shared = Arc::clone(&self.handle.shared);
        shared.active.store(false, Ordering::Release);
        {
            // Under the lock, so no worker misses the wakeup between its
            // active check and parking.
            let _table = shared.table.lock();
            shared.work_available.notify_all();
        }
        self.join_workers();
        info!("kernel stopped");
    }

    fn join_workers(&mut self) {
        for (index, worker) in self.workers.drain(..).enumerate() {
            if worker.join().is_err() {
                error!(worker = index, "worker thread panicked");
            }
        }
    }
}

impl<E: Evaluator> Deref for Kernel<E> {
    type Target = KernelHandle<E>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<E: Evaluator> Drop for Kernel<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Program, ProgramEvaluator};
    use crate::errors::{CreateError, KernelError};

    #[test]
    fn test_kernel_creation() {
        let kernel = Kernel::new(KernelConfig::new(2, 4), ProgramEvaluator::new()).unwrap();
        assert!(!kernel.is_active());
        assert_eq!(kernel.capacity(), 4);
        assert_eq!(kernel.ready_len(), 0);
        assert_eq!(kernel.blocked_len(), 0);
        assert_eq!(kernel.stats(), StatsSnapshot::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Kernel::new(KernelConfig::new(0, 4), ProgramEvaluator::new());
        assert!(matches!(result, Err(LifecycleError::InvalidConfig(_))));
    }

    #[test]
    fn test_create_before_start_and_table_full() {
        let kernel = Kernel::new(KernelConfig::new(1, 2), ProgramEvaluator::new()).unwrap();
        let a = kernel.create_process(Program::InfiniteLoop).unwrap();
        let b = kernel.create_process(Program::InfiniteLoop).unwrap();
        assert_eq!((a.get(), b.get()), (1, 2));

        let err = kernel.create_process(Program::InfiniteLoop).unwrap_err();
        assert!(matches!(err, KernelError::Create(CreateError::TableFull { capacity: 2 })));
        assert_eq!(kernel.snapshot().ready, vec![a, b]);
    }

    #[test]
    fn test_start_twice_fails() {
        let mut kernel = Kernel::launch(KernelConfig::new(1, 1), ProgramEvaluator::new()).unwrap();
        assert!(kernel.is_active());
        assert!(matches!(kernel.start(), Err(LifecycleError::AlreadyStarted)));
        kernel.stop();
    }

    #[test]
    fn test_wait_on_invalid_pid() {
        let kernel = Kernel::new(KernelConfig::new(1, 2), ProgramEvaluator::new()).unwrap();
        let unallocated = ProcessId::new(1).unwrap();
        let out_of_range = ProcessId::new(3).unwrap();

        assert!(matches!(
            kernel.wait(unallocated),
            Err(KernelError::Process(ProcessError::Unallocated(_)))
        ));
        assert!(matches!(
            kernel.wait(out_of_range),
            Err(KernelError::Process(ProcessError::OutOfRange { capacity: 2, .. }))
        ));
        assert!(matches!(
            kernel.kill(out_of_range),
            Err(KernelError::Process(ProcessError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_kill_before_start_logs_exit() {
        let kernel = Kernel::new(KernelConfig::new(1, 2), ProgramEvaluator::new()).unwrap();
        let pid = kernel.create_process(Program::InfiniteLoop).unwrap();

        kernel.kill(pid).unwrap();
        kernel.kill(pid).unwrap();
        kernel.wait(pid).unwrap();

        assert_eq!(kernel.try_next_exit(), Some(pid));
        assert_eq!(kernel.try_next_exit(), None);
        assert_eq!(kernel.stats().killed, 1);
        assert_eq!(kernel.ready_len(), 0);
    }

    #[test]
    fn test_drain_requires_drain_policy() {
        let kernel = Kernel::launch(KernelConfig::new(1, 1), ProgramEvaluator::new()).unwrap();
        assert!(matches!(kernel.drain(), Err(LifecycleError::NotDraining)));
    }

    #[test]
    fn test_reap_drops_unconsumed_exit() {
        let kernel = Kernel::new(KernelConfig::new(1, 2), ProgramEvaluator::new()).unwrap();
        let first = kernel.create_process(Program::InfiniteLoop).unwrap();
        let second = kernel.create_process(Program::InfiniteLoop).unwrap();
        kernel.kill(first).unwrap();
        kernel.kill(second).unwrap();
        assert_eq!(kernel.pending_exits(), 2);

        kernel.reap(first).unwrap();
        assert_eq!(kernel.pending_exits(), 1);
        assert_eq!(kernel.try_next_exit(), Some(second));

        // A reused slot starts with no stale entry for its pid.
        let reused = kernel.create_process(Program::InfiniteLoop).unwrap();
        assert_eq!(reused, first);
        assert_eq!(kernel.pending_exits(), 0);
    }

    #[test]
    fn test_wait_timeout_with_unbounded_duration() {
        let kernel = Kernel::launch(KernelConfig::new(1, 2), ProgramEvaluator::new()).unwrap();
        let finished = kernel.create_process(Program::Bursts(0)).unwrap();
        assert!(kernel.wait_timeout(finished, Duration::MAX).unwrap());

        let looping = kernel.create_process(Program::InfiniteLoop).unwrap();
        let waiter = {
            let handle = kernel.handle();
            thread::spawn(move || handle.wait_timeout(looping, Duration::MAX))
        };
        thread::sleep(Duration::from_millis(10));
        kernel.kill(looping).unwrap();
        assert!(waiter.join().unwrap().unwrap());

        assert!(matches!(
            kernel.wait_timeout(ProcessId::new(3).unwrap(), Duration::MAX),
            Err(KernelError::Process(ProcessError::OutOfRange { .. }))
        ));
        kernel.stop();
    }
}
