//! Reference execution engine running canned programs.

use super::{Evaluator, Quantum, StopReason};
use crate::process::ProgramCounter;
use std::sync::Arc;
use std::time::Duration;

/// A canned program. The program counter counts quanta already run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    /// Never finishes; every quantum expires.
    InfiniteLoop,
    /// Expires `n` quanta, then terminates on the next one.
    Bursts(u32),
    /// Quantum `pc` stops with `script[pc]`; past the end the program
    /// terminates.
    Script(Arc<[StopReason]>),
}

impl Program {
    /// Convenience constructor for [`Program::Script`].
    pub fn script<I: IntoIterator<Item = StopReason>>(steps: I) -> Self {
        Program::Script(steps.into_iter().collect())
    }

    /// The outcome of the quantum starting at `program_counter`.
    pub fn step(&self, program_counter: ProgramCounter) -> Quantum {
        let next = program_counter.saturating_add(1);
        let reason = match self {
            Program::InfiniteLoop => StopReason::QuantumExpired,
            Program::Bursts(n) if program_counter < *n => StopReason::QuantumExpired,
            Program::Bursts(_) => StopReason::Terminated,
            Program::Script(steps) => steps
                .get(program_counter as usize)
                .copied()
                .unwrap_or(StopReason::Terminated),
        };
        Quantum::new(next, reason)
    }
}

/// Evaluates [`Program`]s, optionally burning wall-clock time per quantum.
#[derive(Debug, Clone, Default)]
pub struct ProgramEvaluator {
    quantum: Duration,
}

impl ProgramEvaluator {
    /// An evaluator whose quanta return immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `quantum` inside every evaluation.
    pub fn with_quantum(quantum: Duration) -> Self {
        Self { quantum }
    }

    pub fn quantum(&self) -> Duration {
        self.quantum
    }
}

impl Evaluator for ProgramEvaluator {
    type Code = Program;

    fn evaluate(&self, code: &Program, program_counter: ProgramCounter) -> Quantum {
        if !self.quantum.is_zero() {
            std::thread::sleep(self.quantum);
        }
        code.step(program_counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bursts() {
        let program = Program::Bursts(2);
        assert_eq!(program.step(0), Quantum::new(1, StopReason::QuantumExpired));
        assert_eq!(program.step(1), Quantum::new(2, StopReason::QuantumExpired));
        assert_eq!(program.step(2), Quantum::new(3, StopReason::Terminated));
    }

    #[test]
    fn test_script_runs_off_the_end() {
        let program = Program::script([StopReason::Blocked, StopReason::QuantumExpired]);
        assert_eq!(program.step(0).reason, StopReason::Blocked);
        assert_eq!(program.step(1).reason, StopReason::QuantumExpired);
        assert_eq!(program.step(2).reason, StopReason::Terminated);
    }

    #[test]
    fn test_infinite_loop_never_terminates() {
        let evaluator = ProgramEvaluator::new();
        for pc in [0, 1, 1000, u32::MAX] {
            let quantum = evaluator.evaluate(&Program::InfiniteLoop, pc);
            assert_eq!(quantum.reason, StopReason::QuantumExpired);
        }
    }
}
