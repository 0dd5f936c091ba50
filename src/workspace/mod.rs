//! Workspace management: the directory all steps of a run share

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Error types for workspace operations
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("could not determine a data directory for the default workspace")]
    NoDataDir,

    #[error("path '{0}' escapes the workspace")]
    PathEscapes(String),

    #[error("failed to prepare workspace at {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const INTERNAL_DIR: &str = ".conveyor";
const LOG_DIR: &str = "logs";
const ENV_FILE: &str = "env";

/// The shared filesystem directory a workflow runs in
///
/// Checkout destinations, working directories, and readiness paths all
/// resolve against the workspace root. Run artifacts (the export file,
/// service logs) live under `.conveyor/` inside it.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Use `root` as the workspace without touching the filesystem
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Default workspace root for a workflow, under the platform local
    /// data directory
    pub fn default_root(workflow_name: &str) -> Result<PathBuf, WorkspaceError> {
        let base = dirs::data_local_dir().ok_or(WorkspaceError::NoDataDir)?;
        Ok(base
            .join("conveyor")
            .join("workspaces")
            .join(slug(workflow_name)))
    }

    /// Create the workspace directories and truncate the export file
    ///
    /// Called once before the first step; a pre-existing workspace is
    /// reused as-is apart from the export file reset.
    pub fn prepare(&self) -> Result<(), WorkspaceError> {
        let log_dir = self.log_dir();
        std::fs::create_dir_all(&log_dir).map_err(|e| WorkspaceError::Prepare {
            path: log_dir.clone(),
            source: e,
        })?;
        std::fs::write(self.env_file(), "").map_err(|e| WorkspaceError::Prepare {
            path: self.env_file(),
            source: e,
        })?;
        debug!("workspace ready at {}", self.root.display());
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the export file
    pub fn env_file(&self) -> PathBuf {
        self.root.join(INTERNAL_DIR).join(ENV_FILE)
    }

    /// Directory service logs are written to
    pub fn log_dir(&self) -> PathBuf {
        self.root.join(INTERNAL_DIR).join(LOG_DIR)
    }

    /// Log file for a background step
    pub fn service_log(&self, step_id: &str) -> PathBuf {
        self.log_dir().join(format!("{}.log", step_id))
    }

    /// Resolve a workspace-relative path
    ///
    /// Absolute paths and `..` traversal above the root are rejected, so a
    /// workflow file cannot write outside its workspace.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, WorkspaceError> {
        let path = Path::new(relative);
        if path.is_absolute() {
            return Err(WorkspaceError::PathEscapes(relative.to_string()));
        }
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(WorkspaceError::PathEscapes(relative.to_string()));
        }
        Ok(self.root.join(path))
    }
}

/// Filesystem-safe slug for a workflow name
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "workflow".to_string()
    } else {
        out
    }
}
