//! Test helper utilities and common functionality.

use crate::engine::{Evaluator, Program, Quantum};
use crate::kernel::TableSnapshot;
use crate::process::{ProcessId, ProcessState, ProcessTable, ProgramCounter};
use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicUsize, Ordering};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Generous upper bound for anything a test waits on.
pub(crate) const PATIENCE: Duration = Duration::from_secs(10);

/// Poll `condition` until it holds or `timeout` passes.
pub(crate) fn wait_for<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Snapshot of a bare table in the same shape the kernel reports.
pub(crate) fn table_snapshot<C>(table: &ProcessTable<C>) -> TableSnapshot {
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

/// Check the queue/state agreement the scheduler relies on.
///
/// Every queued pid is allocated and in the matching state, no pid is
/// queued twice, and every ready or blocked process is queued.
pub(crate) fn assert_table_consistent(snapshot: &TableSnapshot) {
    let state_of = |pid: ProcessId| {
        snapshot
            .processes
            .iter()
            .find(|info| info.pid == pid)
            .map(|info| info.state)
    };

    let mut queued = HashSet::new();
    for &pid in &snapshot.ready {
        assert!(queued.insert(pid), "pid {pid} queued twice");
        assert_eq!(state_of(pid), Some(ProcessState::Ready), "ready queue holds {pid}");
    }
    for &pid in &snapshot.blocked {
        assert!(queued.insert(pid), "pid {pid} queued twice");
        assert_eq!(state_of(pid), Some(ProcessState::Blocked), "blocked queue holds {pid}");
    }

    let mut pids = HashSet::new();
    for info in &snapshot.processes {
        assert!(pids.insert(info.pid), "pid {} listed twice", info.pid);
        match info.state {
            ProcessState::Ready | ProcessState::Blocked => {
                assert!(queued.contains(&info.pid), "{} process {} is not queued", info.state, info.pid);
            }
            _ => assert!(!queued.contains(&info.pid), "{} process {} is queued", info.state, info.pid),
        }
    }
}

/// A program tagged with a label the evaluator records on every quantum.
#[derive(Debug, Clone)]
pub(crate) struct Tagged {
    pub(crate) tag: u32,
    pub(crate) program: Program,
}

impl Tagged {
    pub(crate) fn new(tag: u32, program: Program) -> Self {
        Self { tag, program }
    }
}

/// Records the order in which processes get quanta.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingEvaluator {
    log: Arc<Mutex<Vec<u32>>>,
}

impl RecordingEvaluator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn log(&self) -> Vec<u32> {
        self.log.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.log.lock().len()
    }
}

impl Evaluator for RecordingEvaluator {
    type Code = Tagged;

    fn evaluate(&self, code: &Tagged, program_counter: ProgramCounter) -> Quantum {
        self.log.lock().push(code.tag);
        code.program.step(program_counter)
    }
}

/// Holds every quantum until the test opens the gate.
#[derive(Default)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
    entered: AtomicUsize,
}

impl Gate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Quanta that have started, including those still held.
    pub(crate) fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub(crate) fn open(&self) {
        let mut open = self.open.lock();
        *open = true;
        self.opened.notify_all();
    }

    fn pass(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }
}

#[derive(Clone)]
pub(crate) struct GateEvaluator {
    pub(crate) gate: Arc<Gate>,
}

impl Evaluator for GateEvaluator {
    type Code = Program;

    fn evaluate(&self, code: &Program, program_counter: ProgramCounter) -> Quantum {
        self.gate.pass();
        code.step(program_counter)
    }
}

/// Panics on any code flagged `true`; otherwise terminates at once.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PanickingEvaluator;

impl Evaluator for PanickingEvaluator {
    type Code = bool;

    fn evaluate(&self, code: &bool, program_counter: ProgramCounter) -> Quantum {
        if *code {
            panic!("engine fault at pc {program_counter}");
        }
        Program::Bursts(0).step(program_counter)
    }
}
