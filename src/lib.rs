//! conveyor - a local runner for declarative CI workflows

pub mod cli;
pub mod core;
pub mod execution;
pub mod git;
pub mod persistence;
pub mod shell;
pub mod workspace;

// Re-export commonly used types
pub use core::{RunContext, RunState, RunStatus, Step, StepState, TriggerEvent, Workflow};
pub use execution::{EventHandler, ExecutionEvent, RunEngine, StepOutcome};
pub use shell::{CommandRunner, CommandSpec, OutputCallback, SystemShell};
pub use workspace::Workspace;
