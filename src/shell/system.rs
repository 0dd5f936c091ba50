//! Command runner backed by real child processes

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::shell::{
    CommandOutput, CommandRunner, CommandSpec, OutputCallback, OutputLine, ServiceProcess,
    ShellError, StreamSource,
};

/// Runs commands through `tokio::process`
///
/// Children inherit the parent environment with the `CommandSpec` entries
/// layered on top, and are killed if the run is abandoned mid-flight
/// (`kill_on_drop`).
#[derive(Debug, Clone, Default)]
pub struct SystemShell;

impl SystemShell {
    pub fn new() -> Self {
        Self
    }

    fn base_command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

fn io_error(label: &str, source: std::io::Error) -> ShellError {
    ShellError::Io {
        label: label.to_string(),
        source,
    }
}

fn missing_pipe(label: &str) -> ShellError {
    io_error(
        label,
        std::io::Error::new(std::io::ErrorKind::Other, "child pipe not captured"),
    )
}

#[async_trait]
impl CommandRunner for SystemShell {
    async fn run(
        &self,
        spec: &CommandSpec,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<CommandOutput, ShellError> {
        debug!("spawning {}: {}", spec.label, spec.display_line());

        let mut child = Self::base_command(spec)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ShellError::Spawn {
                label: spec.label.clone(),
                source: e,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| missing_pipe(&spec.label))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe(&spec.label))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_done = false;
        let mut err_done = false;
        let mut stdout_buf: Vec<String> = Vec::new();
        let mut stderr_buf: Vec<String> = Vec::new();

        // Drain both pipes to EOF before reaping, so a chatty child can
        // never deadlock on a full pipe.
        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => {
                    match line.map_err(|e| io_error(&spec.label, e))? {
                        Some(text) => {
                            if let Some(cb) = callback {
                                cb.on_line(&OutputLine {
                                    source: StreamSource::Stdout,
                                    text: text.clone(),
                                });
                            }
                            stdout_buf.push(text);
                        }
                        None => out_done = true,
                    }
                }
                line = err_lines.next_line(), if !err_done => {
                    match line.map_err(|e| io_error(&spec.label, e))? {
                        Some(text) => {
                            if let Some(cb) = callback {
                                cb.on_line(&OutputLine {
                                    source: StreamSource::Stderr,
                                    text: text.clone(),
                                });
                            }
                            stderr_buf.push(text);
                        }
                        None => err_done = true,
                    }
                }
            }
        }

        let status = child.wait().await.map_err(|e| io_error(&spec.label, e))?;

        let output = CommandOutput {
            status: status.code(),
            stdout: join_lines(&stdout_buf),
            stderr: join_lines(&stderr_buf),
        };

        if output.success() {
            debug!("{} completed", spec.label);
        } else {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            warn!("{} exited with {}: {}", spec.label, code, output.error_text());
        }

        Ok(output)
    }

    async fn spawn_service(
        &self,
        spec: &CommandSpec,
        log_path: &Path,
    ) -> Result<Box<dyn ServiceProcess>, ShellError> {
        let log = std::fs::File::create(log_path).map_err(|e| io_error(&spec.label, e))?;
        let log_err = log.try_clone().map_err(|e| io_error(&spec.label, e))?;

        debug!(
            "launching service {} (log: {}): {}",
            spec.label,
            log_path.display(),
            spec.display_line()
        );

        let child = Self::base_command(spec)
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| ShellError::Spawn {
                label: spec.label.clone(),
                source: e,
            })?;

        Ok(Box::new(SystemService {
            child,
            label: spec.label.clone(),
        }))
    }
}

fn join_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!("{}\n", lines.join("\n"))
    }
}

/// A running background service owned by the runner
#[derive(Debug)]
pub struct SystemService {
    child: Child,
    label: String,
}

#[async_trait]
impl ServiceProcess for SystemService {
    fn poll_exit(&mut self) -> Result<Option<i32>, ShellError> {
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(status.code().unwrap_or(-1))),
            Ok(None) => Ok(None),
            Err(e) => Err(io_error(&self.label, e)),
        }
    }

    async fn shutdown(&mut self) -> Result<(), ShellError> {
        if let Ok(Some(code)) = self.child.try_wait() {
            debug!("service {} already exited with {:?}", self.label, code.code());
            return Ok(());
        }
        debug!("stopping service {}", self.label);
        self.child.kill().await.map_err(|e| io_error(&self.label, e))
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }
}
