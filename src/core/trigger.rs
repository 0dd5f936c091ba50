//! Trigger matching: which events and branches a workflow runs for

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::config::TriggersConfig;

/// Events a workflow can be triggered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Push,
    /// Accepted on the command line as either spelling
    #[value(alias = "pull_request")]
    PullRequest,
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerEvent::Push => write!(f, "push"),
            TriggerEvent::PullRequest => write!(f, "pull_request"),
        }
    }
}

/// Branch filter for one event
///
/// Branch names match exactly; an empty filter matches any branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFilter {
    pub branches: Vec<String>,
}

impl BranchFilter {
    pub fn matches(&self, branch: &str) -> bool {
        self.branches.is_empty() || self.branches.iter().any(|b| b == branch)
    }
}

/// The workflow's declared triggers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSet {
    pub push: Option<BranchFilter>,
    pub pull_request: Option<BranchFilter>,
}

impl TriggerSet {
    pub fn from_config(config: &TriggersConfig) -> Self {
        Self {
            push: config.push.as_ref().map(|f| BranchFilter {
                branches: f.branches.clone(),
            }),
            pull_request: config.pull_request.as_ref().map(|f| BranchFilter {
                branches: f.branches.clone(),
            }),
        }
    }

    fn filter(&self, event: TriggerEvent) -> Option<&BranchFilter> {
        match event {
            TriggerEvent::Push => self.push.as_ref(),
            TriggerEvent::PullRequest => self.pull_request.as_ref(),
        }
    }

    /// Whether a run for `event` on `branch` is allowed
    ///
    /// The event must be declared and its filter must match; an event
    /// missing from the trigger section never matches.
    pub fn permits(&self, event: TriggerEvent, branch: &str) -> bool {
        match self.filter(event) {
            Some(filter) => filter.matches(branch),
            None => false,
        }
    }
}
