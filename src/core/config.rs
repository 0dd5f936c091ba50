//! Workflow configuration from YAML

use crate::core::Workflow;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    pub name: String,

    /// Trigger declaration: which events and branches this workflow runs for
    #[serde(default)]
    pub on: Option<TriggersConfig>,

    /// Workspace directory shared by all steps (optional; a per-workflow
    /// default under the local data dir is used when absent)
    #[serde(default)]
    pub workspace: Option<String>,

    /// Environment variables applied to every step
    #[serde(default)]
    env: HashMap<String, Value>,

    /// Default shell for run steps
    #[serde(default)]
    pub shell: Option<String>,

    /// Default timeout for steps (in seconds); absent means unlimited
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Workflow steps, executed in declaration order
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
///
/// Exactly one of `run` or `checkout` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier
    pub id: String,

    /// Human-readable step name (the id is displayed when absent)
    #[serde(default)]
    pub name: Option<String>,

    /// Inline shell command block
    #[serde(default)]
    pub run: Option<String>,

    /// Parameterized repository checkout
    #[serde(default)]
    pub checkout: Option<CheckoutConfig>,

    /// Step-level environment overrides
    #[serde(default)]
    env: HashMap<String, Value>,

    /// Working directory, relative to the workspace (run steps only)
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Shell override for this step (run steps only)
    #[serde(default)]
    pub shell: Option<String>,

    /// Timeout for this step (overrides the workflow default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Launch this run step as a background service instead of waiting
    /// for it to finish
    #[serde(default)]
    pub background: bool,

    /// Readiness probe for a background step
    #[serde(default)]
    pub readiness: Option<ReadinessConfig>,
}

/// Checkout parameters: which repository to fetch and where to put it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// `owner/repo` shorthand or a full clone URL
    pub repository: String,

    /// Destination directory, relative to the workspace
    pub path: String,

    /// Branch, tag, or commit to check out
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,

    /// Initialize submodules recursively after checkout
    #[serde(default)]
    pub submodules: bool,
}

/// Trigger declaration: event names mapped to branch filters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggersConfig {
    #[serde(default)]
    pub push: Option<BranchFilterConfig>,

    #[serde(default)]
    pub pull_request: Option<BranchFilterConfig>,
}

/// Branch filter for one trigger event
///
/// An empty or absent `branches` list matches any branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchFilterConfig {
    #[serde(default)]
    pub branches: Vec<String>,
}

/// Readiness probe configuration for a background step
///
/// Exactly one of `port`, `path`, `pattern`, or `delay_secs` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Ready when a TCP connection to 127.0.0.1:port succeeds
    #[serde(default)]
    pub port: Option<u16>,

    /// Ready when this workspace-relative file exists
    #[serde(default)]
    pub path: Option<String>,

    /// Ready when the service log matches this pattern
    #[serde(default)]
    pub pattern: Option<String>,

    /// Interpret `pattern` as a regex instead of a substring
    #[serde(default)]
    pub use_regex: bool,

    /// Ready after a fixed delay
    #[serde(default)]
    pub delay_secs: Option<u64>,

    /// Give up waiting after this many seconds (default 30)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse workflow configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Workflow name must not be empty");
        }

        if self.steps.is_empty() {
            anyhow::bail!("Workflow has no steps");
        }

        if let Some(workspace) = &self.workspace {
            if workspace.trim().is_empty() {
                anyhow::bail!("Workspace path must not be empty");
            }
        }

        if self.default_timeout_secs == Some(0) {
            anyhow::bail!("default_timeout_secs must be positive");
        }

        validate_env("workflow", &self.env)?;

        // Check that all step IDs are unique
        let mut seen_ids = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen_ids.insert(&step.id) {
                anyhow::bail!("Duplicate step ID: {}", step.id);
            }
        }

        for step in &self.steps {
            step.validate()?;
        }

        Ok(())
    }

    /// Workflow environment rendered to plain strings
    pub fn env_string_map(&self) -> HashMap<String, String> {
        env_string_map(&self.env)
    }

    /// Convert config to a Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow> {
        Workflow::from_config(self)
    }
}

impl StepConfig {
    fn validate(&self) -> Result<()> {
        if !valid_id(&self.id) {
            anyhow::bail!(
                "Step ID '{}' is invalid: IDs start with a letter or digit and contain only letters, digits, '-' and '_'",
                self.id
            );
        }

        match (&self.run, &self.checkout) {
            (Some(_), Some(_)) => {
                anyhow::bail!("Step '{}' declares both 'run' and 'checkout'", self.id)
            }
            (None, None) => {
                anyhow::bail!("Step '{}' declares neither 'run' nor 'checkout'", self.id)
            }
            _ => {}
        }

        if self.checkout.is_some() {
            if self.background {
                anyhow::bail!("Step '{}': 'background' applies to run steps only", self.id);
            }
            if self.working_dir.is_some() {
                anyhow::bail!("Step '{}': 'working_dir' applies to run steps only", self.id);
            }
            if self.shell.is_some() {
                anyhow::bail!("Step '{}': 'shell' applies to run steps only", self.id);
            }
        }

        if self.readiness.is_some() && !self.background {
            anyhow::bail!(
                "Step '{}': 'readiness' applies to background steps only",
                self.id
            );
        }

        if self.timeout_secs == Some(0) {
            anyhow::bail!("Step '{}': timeout_secs must be positive", self.id);
        }

        if let Some(run) = &self.run {
            if run.trim().is_empty() {
                anyhow::bail!("Step '{}': 'run' block is empty", self.id);
            }
        }

        if let Some(checkout) = &self.checkout {
            checkout.validate(&self.id)?;
        }

        if let Some(readiness) = &self.readiness {
            readiness.validate(&self.id)?;
        }

        if let Some(working_dir) = &self.working_dir {
            validate_relative_path(&self.id, "working_dir", working_dir)?;
        }

        validate_env(&self.id, &self.env)?;

        Ok(())
    }

    /// Step environment rendered to plain strings
    pub fn env_string_map(&self) -> HashMap<String, String> {
        env_string_map(&self.env)
    }
}

impl CheckoutConfig {
    fn validate(&self, step_id: &str) -> Result<()> {
        if self.repository.trim().is_empty() {
            anyhow::bail!("Step '{}': checkout repository must not be empty", step_id);
        }
        validate_relative_path(step_id, "checkout path", &self.path)?;
        Ok(())
    }
}

impl ReadinessConfig {
    fn validate(&self, step_id: &str) -> Result<()> {
        let probes = [
            self.port.is_some(),
            self.path.is_some(),
            self.pattern.is_some(),
            self.delay_secs.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if probes != 1 {
            anyhow::bail!(
                "Step '{}': readiness needs exactly one of 'port', 'path', 'pattern', 'delay_secs'",
                step_id
            );
        }

        if self.use_regex {
            match &self.pattern {
                Some(pattern) => {
                    regex::Regex::new(pattern).map_err(|e| {
                        anyhow::anyhow!("Step '{}': invalid readiness regex: {}", step_id, e)
                    })?;
                }
                None => {
                    anyhow::bail!(
                        "Step '{}': 'use_regex' requires a readiness 'pattern'",
                        step_id
                    );
                }
            }
        }

        if let Some(path) = &self.path {
            validate_relative_path(step_id, "readiness path", path)?;
        }

        if self.timeout_secs == Some(0) {
            anyhow::bail!("Step '{}': readiness timeout_secs must be positive", step_id);
        }

        Ok(())
    }
}

fn valid_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Workspace-relative paths must stay inside the workspace
fn validate_relative_path(step_id: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("Step '{}': {} must not be empty", step_id, field);
    }
    let path = Path::new(value);
    if path.is_absolute() {
        anyhow::bail!(
            "Step '{}': {} must be relative to the workspace, got '{}'",
            step_id,
            field,
            value
        );
    }
    if path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        anyhow::bail!(
            "Step '{}': {} must not traverse above the workspace, got '{}'",
            step_id,
            field,
            value
        );
    }
    Ok(())
}

fn validate_env(owner: &str, env: &HashMap<String, Value>) -> Result<()> {
    for (key, value) in env {
        if key.trim().is_empty() {
            anyhow::bail!("'{}' has an environment variable with an empty name", owner);
        }
        if key.contains('=') {
            anyhow::bail!(
                "'{}' environment variable '{}' must not contain '='",
                owner,
                key
            );
        }
        if scalar_value(value).is_none() {
            anyhow::bail!(
                "'{}' environment variable '{}' must be a string, number, or boolean",
                owner,
                key
            );
        }
    }
    Ok(())
}

/// Render a YAML env map to plain strings (numbers and booleans included)
pub(crate) fn env_string_map(env: &HashMap<String, Value>) -> HashMap<String, String> {
    env.iter()
        .filter_map(|(k, v)| scalar_value(v).map(|s| (k.clone(), s)))
        .collect()
}

fn scalar_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
