//! Command invocation and capture types

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

/// Error types for command execution
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to spawn {label}: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{label} timed out after {secs} seconds")]
    Timeout { label: String, secs: u64 },

    #[error("i/o failure while running {label}: {source}")]
    Io {
        label: String,
        #[source]
        source: std::io::Error,
    },
}

/// A fully resolved command, ready to hand to a [`CommandRunner`]
///
/// The program and arguments are passed to the OS as-is; any shell
/// interpretation has already happened by the time a spec is built.
///
/// [`CommandRunner`]: crate::shell::CommandRunner
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program to invoke
    pub program: String,

    /// Arguments, in order
    pub args: Vec<String>,

    /// Working directory for the child process
    pub cwd: PathBuf,

    /// Environment entries layered over the parent environment
    pub env: HashMap<String, String>,

    /// Short tag used in logs and error messages (e.g. "step build")
    pub label: String,
}

impl CommandSpec {
    /// Create a spec for `program` running in `cwd`
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        let program = program.into();
        Self {
            label: program.clone(),
            program,
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
        }
    }

    /// Append a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the environment entries for the child
    pub fn envs(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Set the log/error tag
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// One-line rendering for debug logs
    pub fn display_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished command
///
/// A non-zero exit is a normal domain outcome here, not an error; callers
/// decide what failure means.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub status: Option<i32>,

    /// Captured stdout
    pub stdout: String,

    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// True when the command exited zero
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stdout and stderr joined in that order, for step transcripts
    pub fn combined(&self) -> String {
        let out = self.stdout.trim_end();
        let err = self.stderr.trim_end();
        match (out.is_empty(), err.is_empty()) {
            (false, false) => format!("{}\n{}", out, err),
            (false, true) => out.to_string(),
            (true, false) => err.to_string(),
            (true, true) => String::new(),
        }
    }

    /// Best diagnostic text for a failure: stderr when present, stdout otherwise
    pub fn error_text(&self) -> String {
        let err = self.stderr.trim();
        if !err.is_empty() {
            return err.to_string();
        }
        self.stdout.trim().to_string()
    }
}
