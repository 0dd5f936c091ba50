//! Persistence layer for workflow run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::RunStatus;
use crate::core::Workflow;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Workflow name
    pub workflow_name: String,

    /// Final run status
    pub status: RunStatus,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run completed (if it did)
    pub completed_at: Option<DateTime<Utc>>,

    /// Progress (0.0 to 1.0)
    pub progress: f64,

    /// Steps that finished successfully (services included)
    pub completed_steps: usize,

    /// Steps that failed
    pub failed_steps: usize,

    /// Steps skipped after a failure
    pub skipped_steps: usize,

    /// Total number of steps
    pub total_steps: usize,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run summary
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// List runs for a workflow, newest first
    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>>;

    /// The most recent run of a workflow
    async fn latest_run(&self, workflow_name: &str) -> Result<Option<RunSummary>>;

    /// List all workflow names with recorded runs
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    runs: tokio::sync::RwLock<std::collections::HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|run| run.workflow_name == workflow_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn latest_run(&self, workflow_name: &str) -> Result<Option<RunSummary>> {
        Ok(self.list_runs(workflow_name).await?.into_iter().next())
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|run| run.workflow_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a finished (or running) workflow
pub fn create_summary(workflow: &Workflow) -> RunSummary {
    RunSummary {
        run_id: workflow.state.run_id,
        workflow_name: workflow.name.clone(),
        status: workflow.state.status,
        started_at: workflow.state.started_at.unwrap_or_else(Utc::now),
        completed_at: workflow.state.completed_at,
        progress: workflow.state.progress(),
        completed_steps: workflow.state.completed_steps,
        failed_steps: workflow.state.failed_steps,
        skipped_steps: workflow.state.skipped_steps,
        total_steps: workflow.state.total_steps,
    }
}
