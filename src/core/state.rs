//! Run state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall status of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run has not started
    Pending,
    /// Run is currently executing
    Running,
    /// Every step finished successfully
    Completed,
    /// A step failed and the run halted
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not started yet
    Pending,
    /// Step is currently running
    Running { started_at: DateTime<Utc> },
    /// Step finished with exit code zero
    Completed {
        output: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed: non-zero exit, signal, timeout, or runner error
    Failed {
        error: String,
        exit_code: Option<i32>,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step never started because an earlier step failed
    Skipped { reason: String },
    /// Step launched a background service that the run left running
    Service {
        started_at: DateTime<Utc>,
        ready_after_ms: Option<u64>,
        pid: Option<u32>,
    },
}

impl StepState {
    /// Check if the step is in a terminal state
    ///
    /// A launched service counts as terminal: the step's job was to start
    /// it, and that job is done.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepState::Pending | StepState::Running { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepState::Failed { .. })
    }

    /// Short lowercase label for display and persistence
    pub fn label(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Running { .. } => "running",
            StepState::Completed { .. } => "completed",
            StepState::Failed { .. } => "failed",
            StepState::Skipped { .. } => "skipped",
            StepState::Service { .. } => "service",
        }
    }
}

/// Overall state of one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run ID
    pub run_id: Uuid,

    /// Current run status
    pub status: RunStatus,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the run completed or failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of steps
    pub total_steps: usize,

    /// Steps that finished successfully (services included)
    pub completed_steps: usize,

    /// Steps that failed
    pub failed_steps: usize,

    /// Steps skipped after a failure
    pub skipped_steps: usize,
}

impl RunState {
    /// Create a new run state
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            total_steps: 0,
            completed_steps: 0,
            failed_steps: 0,
            skipped_steps: 0,
        }
    }

    /// Mark the run as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    /// Mark the run as finished, deriving the final status from the counts
    pub fn finish(&mut self) {
        self.status = if self.failed_steps > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.completed_at = Some(Utc::now());
    }

    pub fn record_completed(&mut self) {
        self.completed_steps += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed_steps += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped_steps += 1;
    }

    /// Calculate progress (0.0 to 1.0) over steps that reached a terminal
    /// state
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        let terminal = self.completed_steps + self.failed_steps + self.skipped_steps;
        terminal as f64 / self.total_steps as f64
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
