//! Workflow domain model

use crate::core::{
    config::WorkflowConfig,
    state::{RunState, RunStatus},
    step::{Step, StepDefaults, DEFAULT_SHELL},
    trigger::{TriggerEvent, TriggerSet},
};
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;

/// A workflow ready to run
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    /// Environment applied to every step
    pub env: HashMap<String, String>,

    /// Declared triggers; `None` means the workflow runs unconditionally
    pub triggers: Option<TriggerSet>,

    /// Workspace directory from the file, when declared
    pub workspace: Option<PathBuf>,

    /// Steps in declaration order, which is execution order
    pub steps: Vec<Step>,

    /// Run state
    pub state: RunState,
}

impl Workflow {
    /// Create a workflow from configuration
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let defaults = StepDefaults {
            shell: config
                .shell
                .clone()
                .unwrap_or_else(|| DEFAULT_SHELL.to_string()),
            timeout_secs: config.default_timeout_secs,
        };

        let steps = config
            .steps
            .iter()
            .map(|step_config| Step::from_config(step_config, &defaults))
            .collect::<Result<Vec<_>>>()?;

        Ok(Workflow {
            name: config.name.clone(),
            env: config.env_string_map(),
            triggers: config.on.as_ref().map(TriggerSet::from_config),
            workspace: config.workspace.as_ref().map(PathBuf::from),
            steps,
            state: RunState::new(),
        })
    }

    /// Whether a run for `event` on `branch` should proceed
    ///
    /// A workflow without a trigger section runs unconditionally.
    pub fn permits(&self, event: TriggerEvent, branch: &str) -> bool {
        match &self.triggers {
            Some(triggers) => triggers.permits(event, branch),
            None => true,
        }
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Get a mutable step by ID
    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Check if every step reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state.is_terminal())
    }

    /// Check if the run failed
    pub fn has_failed(&self) -> bool {
        self.state.status == RunStatus::Failed
    }
}
