//! Main execution engine - orchestrates a whole workflow run

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::{RunContext, RunStatus, StepState, Workflow};
use crate::execution::executor::{StepExecutor, StepOutcome};
use crate::execution::service::ServiceSet;
use crate::shell::{CommandRunner, OutputCallback};
use crate::workspace::Workspace;

/// Events that can occur during a workflow run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        total_steps: usize,
    },
    StepStarted {
        step_id: String,
        name: String,
        index: usize,
        total: usize,
    },
    StepOutput {
        step_id: String,
        output: String,
    },
    StepCompleted {
        step_id: String,
    },
    StepFailed {
        step_id: String,
        error: String,
        exit_code: Option<i32>,
    },
    StepSkipped {
        step_id: String,
        reason: String,
    },
    ServiceStarted {
        step_id: String,
        pid: Option<u32>,
        ready_after_ms: Option<u64>,
        log_path: PathBuf,
    },
    ServiceStopped {
        step_id: String,
        /// Exit code of a service that had already died on its own
        natural_exit: Option<i32>,
    },
    RunCompleted {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Runs a workflow's steps strictly in declaration order
///
/// The first failure halts the run: remaining steps are marked skipped,
/// background services are shut down, and the final status is `Failed`.
pub struct RunEngine<S> {
    executor: StepExecutor<S>,
    event_handlers: Vec<EventHandler>,
}

impl<S: CommandRunner> RunEngine<S> {
    pub fn new(shell: S) -> Self {
        Self {
            executor: StepExecutor::new(shell),
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    ///
    /// Handlers must be registered before `execute` is called.
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the whole workflow
    ///
    /// Failures are recorded in the workflow state rather than returned:
    /// the status always comes back, and it is `Failed` when any step was.
    pub async fn execute(
        &self,
        workflow: &mut Workflow,
        workspace: &Workspace,
        callback: Option<&dyn OutputCallback>,
    ) -> RunStatus {
        let run_id = workflow.state.run_id;
        let total = workflow.steps.len();

        info!("Starting workflow run: {} ({})", workflow.name, run_id);
        self.emit(ExecutionEvent::RunStarted {
            run_id,
            workflow_name: workflow.name.clone(),
            total_steps: total,
        });

        workflow.state.start(total);

        let mut context = RunContext::new(
            workflow.env.clone(),
            workspace.root().to_path_buf(),
            workspace.env_file(),
        );
        let mut services = ServiceSet::new();
        let mut halted: Option<String> = None;

        for index in 0..total {
            let step = workflow.steps[index].clone();

            if let Some(failed_id) = &halted {
                let reason = format!("step '{}' failed", failed_id);
                workflow.steps[index].state = StepState::Skipped {
                    reason: reason.clone(),
                };
                workflow.state.record_skipped();
                self.emit(ExecutionEvent::StepSkipped {
                    step_id: step.id.clone(),
                    reason,
                });
                continue;
            }

            let started_at = Utc::now();
            workflow.steps[index].state = StepState::Running { started_at };
            self.emit(ExecutionEvent::StepStarted {
                step_id: step.id.clone(),
                name: step.display_name().to_string(),
                index,
                total,
            });

            let outcome = self
                .executor
                .execute(&step, &context, workspace, callback)
                .await;

            match outcome {
                StepOutcome::Completed { output } => {
                    workflow.steps[index].state = StepState::Completed {
                        output: output.clone(),
                        started_at,
                        completed_at: Utc::now(),
                    };
                    workflow.state.record_completed();
                    if !output.is_empty() {
                        self.emit(ExecutionEvent::StepOutput {
                            step_id: step.id.clone(),
                            output,
                        });
                    }
                    self.emit(ExecutionEvent::StepCompleted {
                        step_id: step.id.clone(),
                    });
                    // Pick up anything the step exported for later steps.
                    context.refresh_exports();
                }
                StepOutcome::ServiceStarted {
                    service,
                    ready_after,
                    pid,
                    log_path,
                } => {
                    let ready_after_ms = ready_after.map(|d| d.as_millis() as u64);
                    workflow.steps[index].state = StepState::Service {
                        started_at,
                        ready_after_ms,
                        pid,
                    };
                    workflow.state.record_completed();
                    services.push(step.id.clone(), service);
                    self.emit(ExecutionEvent::ServiceStarted {
                        step_id: step.id.clone(),
                        pid,
                        ready_after_ms,
                        log_path,
                    });
                }
                StepOutcome::Failed { error, exit_code } => {
                    workflow.steps[index].state = StepState::Failed {
                        error: error.clone(),
                        exit_code,
                        started_at,
                        failed_at: Utc::now(),
                    };
                    workflow.state.record_failed();
                    self.emit(ExecutionEvent::StepFailed {
                        step_id: step.id.clone(),
                        error,
                        exit_code,
                    });
                    halted = Some(step.id.clone());
                }
            }
        }

        if !services.is_empty() {
            info!("Shutting down background services");
            for (step_id, natural_exit) in services.shutdown_all().await {
                if let Some(code) = natural_exit {
                    warn!("service {} had already exited with code {}", step_id, code);
                }
                self.emit(ExecutionEvent::ServiceStopped {
                    step_id,
                    natural_exit,
                });
            }
        }

        workflow.state.finish();
        let status = workflow.state.status;
        info!("Workflow run finished: {} - {}", workflow.name, status);
        self.emit(ExecutionEvent::RunCompleted { run_id, status });

        status
    }
}
