//! Execution engine interface.
//!
//! The kernel never interprets code itself. A worker hands the engine a code
//! handle and a program counter, and the engine runs one quantum and reports
//! where the program stopped and why.

use crate::process::ProgramCounter;

pub mod program;

pub use program::{Program, ProgramEvaluator};

/// Why a quantum ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The program finished.
    Terminated,
    /// The program used its whole quantum and can run again.
    QuantumExpired,
    /// The program is waiting for an external event.
    Blocked,
}

/// Outcome of one quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantum {
    /// Program counter to resume from.
    pub program_counter: ProgramCounter,
    pub reason: StopReason,
}

impl Quantum {
    pub fn new(program_counter: ProgramCounter, reason: StopReason) -> Self {
        Self {
            program_counter,
            reason,
        }
    }
}

/// An execution engine.
///
/// Implementations must not touch kernel state: they are called without any
/// kernel lock held, possibly from several workers at once.
pub trait Evaluator: Send + Sync + 'static {
    /// Opaque handle to a program. Cloned into each dispatch.
    type Code: Clone + Send + 'static;

    /// Run one quantum of `code` starting at `program_counter`.
    ///
    /// May take arbitrary wall-clock time; a runaway program only ties up the
    /// calling worker.
    fn evaluate(&self, code: &Self::Code, program_counter: ProgramCounter) -> Quantum;
}

impl<E: Evaluator> Evaluator for std::sync::Arc<E> {
    type Code = E::Code;

    fn evaluate(&self, code: &Self::Code, program_counter: ProgramCounter) -> Quantum {
        (**self).evaluate(code, program_counter)
    }
}
