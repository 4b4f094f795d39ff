//! Workload driver: synthesizes batches of processes against a kernel.
//!
//! Driver threads create processes in batches and feed their pids through a
//! [`BlockingQueue`] to reaper threads, which kill, wait for and reap each
//! one. The pipeline is terminated once the drivers are done and the queue
//! has drained; reapers treat termination as "no more work".

use crate::engine::Evaluator;
use crate::errors::{KernelError, KernelResult, QueueError};
use crate::kernel::KernelHandle;
use crate::process::ProcessId;
use crate::sync::BlockingQueue;
use portable_atomic::{AtomicU64, Ordering};
use std::panic;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shape of a synthetic workload.
#[derive(Debug, Clone)]
pub struct Workload {
    drivers: usize,
    reapers: usize,
    iterations: usize,
    batch_size: usize,
    poll: Duration,
    retries: u32,
}

/// Totals from one [`Workload::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadReport {
    /// Processes successfully created.
    pub created: u64,
    /// Creations abandoned because the table stayed full through every retry.
    pub rejected: u64,
    /// Processes killed, waited for and reaped.
    pub reaped: u64,
    pub elapsed: Duration,
}

impl Workload {
    /// `drivers` threads, each creating `iterations` batches of
    /// `batch_size` processes. One reaper per driver by default.
    pub fn new(drivers: usize, iterations: usize, batch_size: usize) -> Self {
        Self {
            drivers,
            reapers: drivers,
            iterations,
            batch_size,
            poll: Duration::from_millis(1),
            retries: 100,
        }
    }

    pub fn reapers(mut self, reapers: usize) -> Self {
        self.reapers = reapers.max(1);
        self
    }

    /// How often the coordinator checks whether the pipeline has drained,
    /// and how long a driver backs off when the table is full.
    pub fn poll(mut self, interval: Duration) -> Self {
        self.poll = interval;
        self
    }

    /// Times a driver retries a creation refused by a full table before
    /// counting it as rejected.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Run the workload to completion.
    ///
    /// `program(driver, iteration, index)` builds the code for each process.
    /// A full table makes the driver back off for one `poll` interval and
    /// retry, while the reapers free slots. A creation still refused after
    /// every retry is logged and counted, not fatal; any other kernel error
    /// aborts the run and is returned.
    pub fn run<E, F>(&self, kernel: &KernelHandle<E>, program: F) -> KernelResult<WorkloadReport>
    where
        E: Evaluator,
        F: Fn(usize, usize, usize) -> E::Code + Sync,
    {
        let started = Instant::now();
        let pipeline: BlockingQueue<ProcessId> = BlockingQueue::new();
        let created = AtomicU64::new(0);
        let rejected = AtomicU64::new(0);
        let reaped = AtomicU64::new(0);

        info!(
            drivers = self.drivers,
            reapers = self.reapers,
            iterations = self.iterations,
            batch_size = self.batch_size,
            "workload started"
        );

        let outcome = thread::scope(|scope| {
            let reapers: Vec<_> = (0..self.reapers)
                .map(|reaper| {
                    let (pipeline, reaped) = (&pipeline, &reaped);
                    scope.spawn(move || reap_loop(kernel, pipeline, reaped, reaper))
                })
                .collect();

            let drivers: Vec<_> = (0..self.drivers)
                .map(|driver| {
                    let (pipeline, created, rejected, program) = (&pipeline, &created, &rejected, &program);
                    scope.spawn(move || {
                        self.drive(kernel, pipeline, created, rejected, program, driver)
                    })
                })
                .collect();

            let mut first_error = None;
            for driver in drivers {
                if let Err(err) = join_scoped(driver) {
                    pipeline.terminate();
                    first_error.get_or_insert(err);
                }
            }

            while !pipeline.is_empty() && !pipeline.is_terminated() {
                thread::sleep(self.poll);
            }
            pipeline.terminate();

            for reaper in reapers {
                if let Err(err) = join_scoped(reaper) {
                    first_error.get_or_insert(err);
                }
            }

            first_error.map_or(Ok(()), Err)
        });

        let report = WorkloadReport {
            created: created.load(Ordering::Relaxed),
            rejected: rejected.load(Ordering::Relaxed),
            reaped: reaped.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        };
        outcome?;

        info!(
            created = report.created,
            rejected = report.rejected,
            reaped = report.reaped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "workload finished"
        );
        Ok(report)
    }

    fn drive<E, F>(
        &self,
        kernel: &KernelHandle<E>,
        pipeline: &BlockingQueue<ProcessId>,
        created: &AtomicU64,
        rejected: &AtomicU64,
        program: &F,
        driver: usize,
    ) -> KernelResult<()>
    where
        E: Evaluator,
        F: Fn(usize, usize, usize) -> E::Code,
    {
        for iteration in 0..self.iterations {
            for index in 0..self.batch_size {
                let mut attempt = 0;
                loop {
                    match kernel.create_process(program(driver, iteration, index)) {
                        Ok(pid) => {
                            created.fetch_add(1, Ordering::Relaxed);
                            debug!(driver, iteration, pid = %pid, "workload created process");
                            pipeline.push(pid);
                        }
                        Err(err)
                            if err.is_table_full()
                                && attempt < self.retries
                                && !pipeline.is_terminated() =>
                        {
                            attempt += 1;
                            thread::sleep(self.poll);
                            continue;
                        }
                        Err(err) if err.is_table_full() => {
                            rejected.fetch_add(1, Ordering::Relaxed);
                            warn!(driver, iteration, retries = attempt, "process table full; creation skipped");
                        }
                        Err(err) => return Err(err),
                    }
                    break;
                }
            }
            if pipeline.is_terminated() {
                break;
            }
        }
        Ok(())
    }
}

fn reap_loop<E: Evaluator>(
    kernel: &KernelHandle<E>,
    pipeline: &BlockingQueue<ProcessId>,
    reaped: &AtomicU64,
    reaper: usize,
) -> KernelResult<()> {
    loop {
        let pid = match pipeline.pop() {
            Ok(pid) => pid,
            Err(QueueError::Terminated) => return Ok(()),
        };

        let result = kernel
            .kill(pid)
            .and_then(|()| kernel.wait(pid))
            .and_then(|()| kernel.reap(pid));
        if let Err(err) = result {
            // Stop the whole pipeline rather than leave drivers feeding a
            // queue nobody drains.
            pipeline.terminate();
            return Err(err);
        }

        reaped.fetch_add(1, Ordering::Relaxed);
        debug!(reaper, pid = %pid, "workload reaped process");
    }
}

fn join_scoped(handle: thread::ScopedJoinHandle<'_, KernelResult<()>>) -> Result<(), KernelError> {
    match handle.join() {
        Ok(result) => result,
        Err(payload) => panic::resume_unwind(payload),
    }
}
