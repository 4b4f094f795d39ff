//! Process control blocks and identifiers.

use core::num::NonZeroU32;

pub mod table;

pub use table::{Dispatch, KillOutcome, ProcessTable, Refile};

/// Program counter: an offset into a process's code.
pub type ProgramCounter = u32;

/// Process identifier.
///
/// A pid is its slot index plus one, so zero is never a valid pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(NonZeroU32);

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ProcessId {
    /// Create a pid from its raw value. Returns `None` for zero.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// The pid owning table slot `slot`.
    pub(crate) fn from_slot(slot: usize) -> Self {
        let raw = u32::try_from(slot + 1).unwrap_or(u32::MAX);
        // slot + 1 >= 1
        Self(NonZeroU32::new(raw).unwrap_or(NonZeroU32::MIN))
    }

    /// Get the raw pid value.
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// The table slot this pid names.
    pub fn slot(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

/// Scheduling state of a table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProcessState {
    /// No process owns the slot.
    Unallocated = 0,
    /// Waiting in the ready queue.
    Ready = 1,
    /// A worker is executing one quantum of it.
    Running = 2,
    /// Waiting in the blocked queue for an event.
    Blocked = 3,
    /// Finished or killed. Absorbing until the slot is reaped.
    Terminated = 4,
}

impl ProcessState {
    /// Whether a process in this state still owns its slot.
    pub fn is_allocated(self) -> bool {
        !matches!(self, ProcessState::Unallocated)
    }
}

impl core::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ProcessState::Unallocated => "unallocated",
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Blocked => "blocked",
            ProcessState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// The scheduler's record for one table slot.
#[derive(Debug, Clone)]
pub struct ProcessControlBlock<C> {
    pub(crate) pid: ProcessId,
    pub(crate) state: ProcessState,
    /// Present exactly while the slot is allocated.
    pub(crate) code: Option<C>,
    pub(crate) program_counter: ProgramCounter,
    /// Bumped on every dispatch; lets a returning worker detect that the
    /// process was killed (or the slot recycled) while it ran.
    pub(crate) dispatch_generation: u64,
    /// Bumped on every allocation of the slot.
    pub(crate) incarnation: u64,
    pub(crate) quanta: u64,
}

impl<C> ProcessControlBlock<C> {
    pub(crate) fn vacant(slot: usize) -> Self {
        Self {
            pid: ProcessId::from_slot(slot),
            state: ProcessState::Unallocated,
            code: None,
            program_counter: 0,
            dispatch_generation: 0,
            incarnation: 0,
            quanta: 0,
        }
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn code(&self) -> Option<&C> {
        self.code.as_ref()
    }

    pub fn program_counter(&self) -> ProgramCounter {
        self.program_counter
    }

    /// Copy out the observable fields.
    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            state: self.state,
            program_counter: self.program_counter,
            quanta: self.quanta,
            incarnation: self.incarnation,
        }
    }
}

/// Snapshot of one process, detached from the table lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: ProcessId,
    pub state: ProcessState,
    pub program_counter: ProgramCounter,
    /// Quanta dispatched to the current incarnation.
    pub quanta: u64,
    /// How many times the slot has been allocated.
    pub incarnation: u64,
}
