//! Workflow execution engine

pub mod engine;
pub mod executor;
pub mod service;

pub use engine::{EventHandler, ExecutionEvent, RunEngine};
pub use executor::{StepExecutor, StepOutcome};
pub use service::{ReadinessError, ServiceSet};
