//! Round-robin dispatch loop.
//!
//! Every worker thread repeats: take the head of the ready queue under the
//! table lock, mark it running, drop the lock, run one quantum through the
//! execution engine, then re-take the lock and re-file the process by the
//! quantum's stop reason. A process whose quantum expired goes to the back of
//! the ready queue, which is all the fairness round-robin needs.

use crate::config::StopPolicy;
use crate::engine::{Evaluator, Quantum, StopReason};
use crate::kernel::Shared;
use crate::process::{Dispatch, Refile};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

/// Body of worker thread `worker`. Returns when the kernel is stopped or,
/// under [`StopPolicy::DrainAndExit`], when no work remains.
pub(crate) fn run_worker<E: Evaluator>(shared: &Shared<E>, worker: usize) {
    info!(worker, "worker started");

    while let Some(dispatch) = next_dispatch(shared, worker) {
        let quantum = run_quantum(shared, worker, &dispatch);
        refile(shared, worker, &dispatch, quantum);
    }

    info!(worker, "worker stopping");
}

/// Wait for a runnable process and mark it running.
fn next_dispatch<E: Evaluator>(shared: &Shared<E>, worker: usize) -> Option<Dispatch<E::Code>> {
    let config = &shared.config;
    let mut table = shared.table.lock();

    loop {
        if !shared.is_active() {
            return None;
        }

        if let Some(dispatch) = table.dispatch_next(config.get_blocked_policy()) {
            shared.stats.record_dispatch();
            debug!(
                worker,
                pid = %dispatch.pid,
                pc = dispatch.program_counter,
                "dispatched"
            );
            return Some(dispatch);
        }

        if config.get_stop_policy() == StopPolicy::DrainAndExit && table.is_idle() {
            debug!(worker, "no ready or blocked processes left");
            return None;
        }

        shared.work_available.wait_for(&mut table, config.get_idle_poll());
    }
}

/// Run one quantum with no lock held.
///
/// A panicking engine terminates the process instead of the worker.
fn run_quantum<E: Evaluator>(shared: &Shared<E>, worker: usize, dispatch: &Dispatch<E::Code>) -> Quantum {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        shared.evaluator.evaluate(&dispatch.code, dispatch.program_counter)
    }));

    result.unwrap_or_else(|_| {
        error!(worker, pid = %dispatch.pid, "execution engine panicked; terminating process");
        Quantum::new(dispatch.program_counter, StopReason::Terminated)
    })
}

fn refile<E: Evaluator>(
    shared: &Shared<E>,
    worker: usize,
    dispatch: &Dispatch<E::Code>,
    quantum: Quantum,
) {
    let pid = dispatch.pid;
    let mut table = shared.table.lock();

    match table.complete(dispatch, quantum) {
        Refile::Ready => {
            shared.stats.record_expired();
            debug!(worker, pid = %pid, pc = quantum.program_counter, "running -> ready");
            shared.work_available.notify_one();
        }
        Refile::Blocked => {
            shared.stats.record_blocked();
            debug!(worker, pid = %pid, pc = quantum.program_counter, "running -> blocked");
        }
        Refile::Terminated => {
            shared.stats.record_terminated();
            shared.exits.push(pid);
            info!(worker, pid = %pid, pc = quantum.program_counter, "process terminated");
            shared.terminated.notify_all();
        }
        Refile::Discarded => {
            shared.stats.record_discarded();
            warn!(
                worker,
                pid = %pid,
                reason = ?quantum.reason,
                "process killed during its quantum; result discarded"
            );
        }
    }
}
