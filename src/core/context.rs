//! Run context - environment layering and the export file

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Variable holding the absolute path of the export file
pub const ENV_FILE_VAR: &str = "CONVEYOR_ENV";

/// Variable holding the workspace root
pub const WORKSPACE_VAR: &str = "CONVEYOR_WORKSPACE";

/// Mutable environment state threaded through a run
///
/// Carries the workflow-level environment plus every variable steps have
/// exported via the export file so far. Steps persist a variable for later
/// steps by appending `KEY=value` lines to `$CONVEYOR_ENV`.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Workflow-level environment
    workflow_env: HashMap<String, String>,

    /// Variables read back from the export file, in file order
    exported: Vec<(String, String)>,

    /// Workspace root
    workspace: PathBuf,

    /// Absolute path of the export file
    env_file: PathBuf,
}

impl RunContext {
    pub fn new(
        workflow_env: HashMap<String, String>,
        workspace: PathBuf,
        env_file: PathBuf,
    ) -> Self {
        Self {
            workflow_env,
            exported: Vec::new(),
            workspace,
            env_file,
        }
    }

    /// Environment entries for one step's process
    ///
    /// Precedence, lowest to highest: runner variables, workflow env,
    /// exported variables, step env. The parent process environment sits
    /// underneath all of these.
    pub fn process_env(&self, step_env: &HashMap<String, String>) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(
            WORKSPACE_VAR.to_string(),
            self.workspace.display().to_string(),
        );
        env.insert(ENV_FILE_VAR.to_string(), self.env_file.display().to_string());
        env.extend(self.workflow_env.clone());
        for (key, value) in &self.exported {
            env.insert(key.clone(), value.clone());
        }
        env.extend(step_env.clone());
        env
    }

    /// Variables exported so far, in file order
    pub fn exported(&self) -> &[(String, String)] {
        &self.exported
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn env_file(&self) -> &Path {
        &self.env_file
    }

    /// Re-read the export file after a step ran
    ///
    /// A missing file just means nothing was exported yet.
    pub fn refresh_exports(&mut self) {
        let content = match std::fs::read_to_string(&self.env_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(
                    "could not read export file {}: {}",
                    self.env_file.display(),
                    e
                );
                return;
            }
        };

        let (exported, skipped) = parse_env_file(&content);
        if skipped > 0 {
            warn!(
                "ignored {} malformed line(s) in {}",
                skipped,
                self.env_file.display()
            );
        }
        self.exported = exported;
    }
}

/// Parse `KEY=value` lines from export-file content
///
/// Blank lines and `#` comments are ignored; a later assignment of the
/// same key wins. Returns the variables in first-seen order plus the
/// number of malformed lines.
pub fn parse_env_file(content: &str) -> (Vec<(String, String)>, usize) {
    let mut vars: Vec<(String, String)> = Vec::new();
    let mut skipped = 0;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                let key = key.trim().to_string();
                let value = value.to_string();
                match vars.iter_mut().find(|(k, _)| *k == key) {
                    Some(existing) => existing.1 = value,
                    None => vars.push((key, value)),
                }
            }
            _ => skipped += 1,
        }
    }

    (vars, skipped)
}
