//! Step executor - runs individual steps through the command runner

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::core::step::{Checkout, RunStep, Step, StepKind};
use crate::core::RunContext;
use crate::execution::service::{self, ReadinessError};
use crate::git;
use crate::shell::{CommandOutput, CommandRunner, CommandSpec, OutputCallback, ServiceProcess};
use crate::workspace::Workspace;

/// Result of executing a single step
pub enum StepOutcome {
    /// Step finished with exit code zero
    Completed { output: String },
    /// Background step launched (and passed its readiness probe, if any)
    ServiceStarted {
        service: Box<dyn ServiceProcess>,
        ready_after: Option<Duration>,
        pid: Option<u32>,
        log_path: PathBuf,
    },
    /// Step failed; the run stops here
    Failed {
        error: String,
        exit_code: Option<i32>,
    },
}

impl fmt::Debug for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Completed { output } => {
                f.debug_struct("Completed").field("output", output).finish()
            }
            StepOutcome::ServiceStarted {
                ready_after,
                pid,
                log_path,
                ..
            } => f
                .debug_struct("ServiceStarted")
                .field("ready_after", ready_after)
                .field("pid", pid)
                .field("log_path", log_path)
                .finish_non_exhaustive(),
            StepOutcome::Failed { error, exit_code } => f
                .debug_struct("Failed")
                .field("error", error)
                .field("exit_code", exit_code)
                .finish(),
        }
    }
}

/// Executes a single step
pub struct StepExecutor<S> {
    shell: S,
}

impl<S: CommandRunner> StepExecutor<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }

    /// Execute a step and report how it ended
    ///
    /// Failures are outcomes, not errors: a non-zero exit, a timeout, or a
    /// spawn problem all come back as `StepOutcome::Failed` so the engine
    /// can record them and stop the run.
    pub async fn execute(
        &self,
        step: &Step,
        context: &RunContext,
        workspace: &Workspace,
        callback: Option<&dyn OutputCallback>,
    ) -> StepOutcome {
        info!("Executing step: {}", step.display_name());

        match &step.kind {
            StepKind::Run(run) if run.background => {
                self.launch_service(step, run, context, workspace).await
            }
            StepKind::Run(run) => self.run_script(step, run, context, workspace, callback).await,
            StepKind::Checkout(checkout) => {
                self.run_checkout(step, checkout, context, workspace, callback)
                    .await
            }
        }
    }

    async fn run_script(
        &self,
        step: &Step,
        run: &RunStep,
        context: &RunContext,
        workspace: &Workspace,
        callback: Option<&dyn OutputCallback>,
    ) -> StepOutcome {
        let spec = match script_spec(step, run, context, workspace) {
            Ok(spec) => spec,
            Err(error) => {
                return StepOutcome::Failed {
                    error,
                    exit_code: None,
                }
            }
        };

        self.run_timed_plan(step, &[spec], callback).await
    }

    async fn run_checkout(
        &self,
        step: &Step,
        checkout: &Checkout,
        context: &RunContext,
        workspace: &Workspace,
        callback: Option<&dyn OutputCallback>,
    ) -> StepOutcome {
        let dest = match workspace.resolve(&checkout.path) {
            Ok(dest) => dest,
            Err(e) => {
                return StepOutcome::Failed {
                    error: e.to_string(),
                    exit_code: None,
                }
            }
        };

        let fresh = !dest.exists();
        if !fresh && !dest.join(".git").is_dir() {
            return StepOutcome::Failed {
                error: format!(
                    "checkout destination '{}' exists but is not a git repository",
                    checkout.path
                ),
                exit_code: None,
            };
        }

        if let Some(parent) = dest.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return StepOutcome::Failed {
                    error: format!("could not create '{}': {}", parent.display(), e),
                    exit_code: None,
                };
            }
        }

        info!(
            "Step {}: {} {}",
            step.id,
            if fresh { "cloning" } else { "updating" },
            checkout.repository
        );

        let env = context.process_env(&step.env);
        let plan: Vec<CommandSpec> = git::checkout_plan(checkout, &dest, workspace.root(), fresh)
            .into_iter()
            .map(|spec| spec.envs(env.clone()))
            .collect();

        self.run_timed_plan(step, &plan, callback).await
    }

    /// Run a sequence of commands under the step's timeout, stopping at the
    /// first failure
    async fn run_timed_plan(
        &self,
        step: &Step,
        plan: &[CommandSpec],
        callback: Option<&dyn OutputCallback>,
    ) -> StepOutcome {
        match step.timeout_secs {
            Some(secs) => {
                match timeout(
                    Duration::from_secs(secs),
                    self.run_plan(step, plan, callback),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        error!("Step {} timed out after {}s", step.id, secs);
                        StepOutcome::Failed {
                            error: format!("Timeout after {} seconds", secs),
                            exit_code: None,
                        }
                    }
                }
            }
            None => self.run_plan(step, plan, callback).await,
        }
    }

    async fn run_plan(
        &self,
        step: &Step,
        plan: &[CommandSpec],
        callback: Option<&dyn OutputCallback>,
    ) -> StepOutcome {
        let mut transcript = String::new();
        for spec in plan {
            debug!("step {}: {}", step.id, spec.display_line());

            let output = match self.shell.run(spec, callback).await {
                Ok(output) => output,
                Err(e) => {
                    error!("Runner error in step {}: {}", step.id, e);
                    return StepOutcome::Failed {
                        error: e.to_string(),
                        exit_code: None,
                    };
                }
            };

            if !output.success() {
                let error = format!("{} {}", spec.label, failure_message(&output));
                error!("Step {} failed: {}", step.id, error);
                return StepOutcome::Failed {
                    error,
                    exit_code: output.status,
                };
            }

            let combined = output.combined();
            if !combined.is_empty() {
                transcript.push_str(&combined);
                transcript.push('\n');
            }
        }

        info!("Step {} completed successfully", step.id);
        StepOutcome::Completed { output: transcript }
    }

    async fn launch_service(
        &self,
        step: &Step,
        run: &RunStep,
        context: &RunContext,
        workspace: &Workspace,
    ) -> StepOutcome {
        let spec = match script_spec(step, run, context, workspace) {
            Ok(spec) => spec,
            Err(error) => {
                return StepOutcome::Failed {
                    error,
                    exit_code: None,
                }
            }
        };
        let log_path = workspace.service_log(&step.id);

        let mut service = match self.shell.spawn_service(&spec, &log_path).await {
            Ok(service) => service,
            Err(e) => {
                error!("Could not launch service for step {}: {}", step.id, e);
                return StepOutcome::Failed {
                    error: e.to_string(),
                    exit_code: None,
                };
            }
        };
        let pid = service.id();

        let ready_after = match &run.readiness {
            Some(probe) => {
                info!("Waiting for service {} to become ready", step.id);
                match service::wait_ready(probe, service.as_mut(), workspace.root(), &log_path)
                    .await
                {
                    Ok(elapsed) => {
                        info!("Service {} ready after {}ms", step.id, elapsed.as_millis());
                        Some(elapsed)
                    }
                    Err(e) => {
                        let exit_code = match &e {
                            ReadinessError::ExitedEarly { code, .. } => Some(*code),
                            ReadinessError::TimedOut { .. } => None,
                        };
                        error!("Service {} never became ready: {}", step.id, e);
                        if let Err(stop_err) = service.shutdown().await {
                            warn!("could not stop service {}: {}", step.id, stop_err);
                        }
                        return StepOutcome::Failed {
                            error: e.to_string(),
                            exit_code,
                        };
                    }
                }
            }
            None => {
                warn!(
                    "Step {} launches a service with no readiness probe; later steps may race its startup",
                    step.id
                );
                None
            }
        };

        StepOutcome::ServiceStarted {
            service,
            ready_after,
            pid,
            log_path,
        }
    }
}

fn script_spec(
    step: &Step,
    run: &RunStep,
    context: &RunContext,
    workspace: &Workspace,
) -> Result<CommandSpec, String> {
    let cwd = match &step.working_dir {
        Some(dir) => workspace.resolve(dir).map_err(|e| e.to_string())?,
        None => workspace.root().to_path_buf(),
    };

    Ok(CommandSpec::new(run.shell.clone(), cwd)
        .arg("-c")
        .arg(run.script.clone())
        .envs(context.process_env(&step.env))
        .label(format!("step {}", step.id)))
}

fn failure_message(output: &CommandOutput) -> String {
    let detail = output.error_text();
    match output.status {
        Some(code) if detail.is_empty() => format!("exited with code {}", code),
        Some(code) => format!("exited with code {}: {}", code, detail),
        None if detail.is_empty() => "terminated by signal".to_string(),
        None => format!("terminated by signal: {}", detail),
    }
}
