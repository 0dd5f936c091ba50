//! Step domain model

use crate::core::{
    config::{ReadinessConfig, StepConfig},
    state::StepState,
};
use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;

/// Shell used for run steps when neither the step nor the workflow picks one
pub const DEFAULT_SHELL: &str = "sh";

/// How long a readiness probe waits before giving up, unless overridden
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 30;

/// A single step in a workflow
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step identifier
    pub id: String,

    /// Optional display name
    pub name: Option<String>,

    /// What the step does when it runs
    pub kind: StepKind,

    /// Step-level environment overrides
    pub env: HashMap<String, String>,

    /// Working directory relative to the workspace (run steps)
    pub working_dir: Option<String>,

    /// Effective timeout in seconds; `None` means unlimited
    pub timeout_secs: Option<u64>,

    /// Runtime state
    pub state: StepState,
}

/// What a step does when it runs
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Inline shell command block
    Run(RunStep),
    /// Parameterized repository checkout
    Checkout(Checkout),
}

/// An inline shell command block
#[derive(Debug, Clone)]
pub struct RunStep {
    /// The block handed to `shell -c`
    pub script: String,

    /// Shell program for this step
    pub shell: String,

    /// Launch as a background service instead of waiting
    pub background: bool,

    /// Readiness probe for a background launch
    pub readiness: Option<ReadinessProbe>,
}

/// Checkout parameters resolved from config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    /// `owner/repo` shorthand or a full clone URL
    pub repository: String,

    /// Destination directory relative to the workspace
    pub path: String,

    /// Branch, tag, or commit to check out
    pub reference: Option<String>,

    /// Initialize submodules recursively
    pub submodules: bool,
}

/// Pattern for matching service log content (not serializable due to Regex)
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Simple string contains match
    Simple(String),
    /// Regular expression match
    Regex(Regex),
}

impl Pattern {
    pub fn new(pattern: &str, use_regex: bool) -> Result<Self> {
        if use_regex {
            Ok(Pattern::Regex(Regex::new(pattern)?))
        } else {
            Ok(Pattern::Simple(pattern.to_string()))
        }
    }

    /// Check if the pattern matches the given text
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Pattern::Simple(pattern) => text.contains(pattern),
            Pattern::Regex(regex) => regex.is_match(text),
        }
    }
}

/// Condition a background service must satisfy before the run continues
#[derive(Debug, Clone)]
pub enum ReadinessCheck {
    /// A TCP connection to 127.0.0.1:port succeeds
    Port(u16),
    /// A workspace-relative file exists
    PathExists(String),
    /// The service log matches a pattern
    LogMatch(Pattern),
    /// A fixed delay has elapsed
    Delay(Duration),
}

/// Readiness probe for a background step
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    /// What to check
    pub check: ReadinessCheck,

    /// How long to keep checking before the step fails
    pub timeout: Duration,
}

impl ReadinessProbe {
    pub fn from_config(config: &ReadinessConfig) -> Result<Self> {
        let check = if let Some(port) = config.port {
            ReadinessCheck::Port(port)
        } else if let Some(path) = &config.path {
            ReadinessCheck::PathExists(path.clone())
        } else if let Some(pattern) = &config.pattern {
            ReadinessCheck::LogMatch(Pattern::new(pattern, config.use_regex)?)
        } else if let Some(delay) = config.delay_secs {
            ReadinessCheck::Delay(Duration::from_secs(delay))
        } else {
            anyhow::bail!("readiness declares no probe");
        };

        Ok(Self {
            check,
            timeout: Duration::from_secs(
                config.timeout_secs.unwrap_or(DEFAULT_READINESS_TIMEOUT_SECS),
            ),
        })
    }
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Result<Self> {
        let kind = if let Some(script) = &config.run {
            let readiness = config
                .readiness
                .as_ref()
                .map(ReadinessProbe::from_config)
                .transpose()?;

            StepKind::Run(RunStep {
                script: script.clone(),
                shell: config
                    .shell
                    .clone()
                    .unwrap_or_else(|| defaults.shell.clone()),
                background: config.background,
                readiness,
            })
        } else if let Some(checkout) = &config.checkout {
            StepKind::Checkout(Checkout {
                repository: checkout.repository.clone(),
                path: checkout.path.clone(),
                reference: checkout.reference.clone(),
                submodules: checkout.submodules,
            })
        } else {
            anyhow::bail!("Step '{}' declares neither 'run' nor 'checkout'", config.id);
        };

        Ok(Step {
            id: config.id.clone(),
            name: config.name.clone(),
            kind,
            env: config.env_string_map(),
            working_dir: config.working_dir.clone(),
            timeout_secs: config.timeout_secs.or(defaults.timeout_secs),
            state: StepState::Pending,
        })
    }

    /// Display name: the explicit name when set, the id otherwise
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Whether this step launches a background service
    pub fn is_background(&self) -> bool {
        matches!(&self.kind, StepKind::Run(run) if run.background)
    }
}

/// Workflow-level defaults applied while building steps
#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub shell: String,
    pub timeout_secs: Option<u64>,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            timeout_secs: None,
        }
    }
}
