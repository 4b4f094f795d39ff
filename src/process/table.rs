//! Fixed-capacity process table with its ready and blocked queues.
//!
//! The table is a plain data structure: it performs no locking of its own.
//! The kernel keeps it behind a single mutex, and every method here is one
//! atomic step of the scheduling state machine when called under that lock.

use super::{ProcessControlBlock, ProcessId, ProcessInfo, ProcessState, ProgramCounter};
use crate::config::BlockedPolicy;
use crate::engine::{Quantum, StopReason};
use crate::errors::{CreateError, ProcessError};
use std::collections::VecDeque;

/// A process handed to a worker for one quantum.
///
/// Carries everything the worker needs to run the quantum without the table
/// lock, plus the dispatch generation used to validate the re-file.
#[derive(Debug, Clone)]
pub struct Dispatch<C> {
    pub pid: ProcessId,
    pub code: C,
    pub program_counter: ProgramCounter,
    pub(crate) generation: u64,
}

/// Where a process went after its quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refile {
    /// Back to the tail of the ready queue.
    Ready,
    /// Onto the tail of the blocked queue.
    Blocked,
    /// Finished; the slot stays allocated until reaped.
    Terminated,
    /// The process was killed (or its slot recycled) during the quantum.
    /// The result was dropped.
    Discarded,
}

/// Result of a kill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// The process was alive; `previous` is the state it was killed in.
    Killed { previous: ProcessState },
    /// Nothing to do.
    AlreadyTerminated,
}

/// Process table plus ready and blocked queues.
pub struct ProcessTable<C> {
    slots: Box<[ProcessControlBlock<C>]>,
    ready: VecDeque<ProcessId>,
    blocked: VecDeque<ProcessId>,
}

impl<C> ProcessTable<C> {
    /// Create a table with `capacity` unallocated slots.
    pub fn new(capacity: usize) -> Self {
        let slots: Vec<_> = (0..capacity).map(ProcessControlBlock::vacant).collect();
        Self {
            slots: slots.into_boxed_slice(),
            ready: VecDeque::with_capacity(capacity),
            blocked: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Allocate the lowest unallocated slot and queue it as ready.
    ///
    /// # Returns
    ///
    /// The new pid, or `CreateError::TableFull` if every slot is taken.
    pub fn allocate(&mut self, code: C) -> Result<ProcessId, CreateError> {
        let capacity = self.capacity();
        let pcb = self
            .slots
            .iter_mut()
            .find(|pcb| pcb.state == ProcessState::Unallocated)
            .ok_or(CreateError::TableFull { capacity })?;

        pcb.state = ProcessState::Ready;
        pcb.code = Some(code);
        pcb.program_counter = 0;
        pcb.quanta = 0;
        pcb.incarnation += 1;

        let pid = pcb.pid;
        self.ready.push_back(pid);
        Ok(pid)
    }

    /// Look up a slot by pid, allocated or not.
    pub fn pcb(&self, pid: ProcessId) -> Result<&ProcessControlBlock<C>, ProcessError> {
        let capacity = self.capacity();
        self.slots
            .get(pid.slot())
            .ok_or(ProcessError::OutOfRange { pid, capacity })
    }

    fn pcb_mut(&mut self, pid: ProcessId) -> Result<&mut ProcessControlBlock<C>, ProcessError> {
        let capacity = self.capacity();
        self.slots
            .get_mut(pid.slot())
            .ok_or(ProcessError::OutOfRange { pid, capacity })
    }

    /// Look up a slot that a process currently owns.
    pub fn allocated(&self, pid: ProcessId) -> Result<&ProcessControlBlock<C>, ProcessError> {
        let pcb = self.pcb(pid)?;
        if pcb.state.is_allocated() {
            Ok(pcb)
        } else {
            Err(ProcessError::Unallocated(pid))
        }
    }

    pub fn info(&self, pid: ProcessId) -> Result<ProcessInfo, ProcessError> {
        self.allocated(pid).map(ProcessControlBlock::info)
    }

    /// Terminate `pid` and pull it out of whichever queue holds it.
    ///
    /// A worker currently running the process is not interrupted; its
    /// re-file is discarded by [`complete`](Self::complete).
    pub fn kill(&mut self, pid: ProcessId) -> Result<KillOutcome, ProcessError> {
        let pcb = self.pcb_mut(pid)?;
        let previous = pcb.state;
        match previous {
            ProcessState::Unallocated => return Err(ProcessError::Unallocated(pid)),
            ProcessState::Terminated => return Ok(KillOutcome::AlreadyTerminated),
            _ => pcb.state = ProcessState::Terminated,
        }

        remove_first(&mut self.ready, pid);
        remove_first(&mut self.blocked, pid);
        Ok(KillOutcome::Killed { previous })
    }

    /// Move the oldest blocked process to the tail of the ready queue.
    ///
    /// Returns the promoted pid, or `None` if nothing is blocked.
    pub fn promote_blocked(&mut self) -> Option<ProcessId> {
        let pid = self.blocked.pop_front()?;
        if let Some(pcb) = self.slots.get_mut(pid.slot()) {
            pcb.state = ProcessState::Ready;
        }
        self.ready.push_back(pid);
        Some(pid)
    }

    /// Return a terminated slot to the unallocated pool.
    pub fn reap(&mut self, pid: ProcessId) -> Result<(), ProcessError> {
        let pcb = self.pcb_mut(pid)?;
        match pcb.state {
            ProcessState::Terminated => {
                pcb.state = ProcessState::Unallocated;
                pcb.code = None;
                pcb.program_counter = 0;
                Ok(())
            }
            ProcessState::Unallocated => Err(ProcessError::Unallocated(pid)),
            _ => Err(ProcessError::NotTerminated(pid)),
        }
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn blocked_len(&self) -> usize {
        self.blocked.len()
    }

    /// True when neither queue holds a pid.
    pub fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.blocked.is_empty()
    }

    /// Ready queue, head first.
    pub fn ready(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.ready.iter().copied()
    }

    /// Blocked queue, oldest first.
    pub fn blocked(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.blocked.iter().copied()
    }

    /// Every slot in pid order.
    pub fn iter(&self) -> impl Iterator<Item = &ProcessControlBlock<C>> + '_ {
        self.slots.iter()
    }

    /// Apply the outcome of a quantum.
    ///
    /// The re-file only happens if the slot is still `Running` under the same
    /// dispatch generation; otherwise the result is discarded.
    pub fn complete(&mut self, dispatch: &Dispatch<C>, quantum: Quantum) -> Refile {
        let Some(pcb) = self.slots.get_mut(dispatch.pid.slot()) else {
            return Refile::Discarded;
        };
        if pcb.state != ProcessState::Running || pcb.dispatch_generation != dispatch.generation {
            return Refile::Discarded;
        }

        pcb.program_counter = quantum.program_counter;
        match quantum.reason {
            StopReason::Terminated => {
                pcb.state = ProcessState::Terminated;
                Refile::Terminated
            }
            StopReason::QuantumExpired => {
                pcb.state = ProcessState::Ready;
                self.ready.push_back(dispatch.pid);
                Refile::Ready
            }
            StopReason::Blocked => {
                pcb.state = ProcessState::Blocked;
                self.blocked.push_back(dispatch.pid);
                Refile::Blocked
            }
        }
    }
}

impl<C: Clone> ProcessTable<C> {
    /// Pick the next process to run and mark it `Running`.
    ///
    /// Takes the head of the ready queue; under
    /// [`BlockedPolicy::RunBlockedAsFallback`] an empty ready queue falls
    /// back to the head of the blocked queue.
    pub fn dispatch_next(&mut self, policy: BlockedPolicy) -> Option<Dispatch<C>> {
        loop {
            let pid = match self.ready.pop_front() {
                Some(pid) => pid,
                None if policy == BlockedPolicy::RunBlockedAsFallback => self.blocked.pop_front()?,
                None => return None,
            };

            let Some(pcb) = self.slots.get_mut(pid.slot()) else {
                continue;
            };
            let Some(code) = pcb.code.clone() else {
                continue;
            };

            pcb.state = ProcessState::Running;
            pcb.dispatch_generation += 1;
            pcb.quanta += 1;
            return Some(Dispatch {
                pid,
                code,
                program_counter: pcb.program_counter,
                generation: pcb.dispatch_generation,
            });
        }
    }
}

fn remove_first(queue: &mut VecDeque<ProcessId>, pid: ProcessId) {
    if let Some(index) = queue.iter().position(|&queued| queued == pid) {
        queue.remove(index);
    }
}
