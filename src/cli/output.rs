//! CLI output formatting

use crate::{core::RunStatus, core::StepState, execution::ExecutionEvent, persistence::RunSummary};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "* ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("COMPLETED").green().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
        StepState::Service { .. } => style("SERVICE").blue().to_string(),
    }
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Completed => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::Pending => INFO,
    };

    format!(
        "{} {} - {} - {} ({}/{}) - {}",
        status_icon,
        style(&summary.run_id.to_string()[..8]).dim(),
        style(&summary.workflow_name).bold(),
        format_status(summary.status),
        summary.completed_steps,
        summary.total_steps,
        style(format!("{:.0}%", summary.progress * 100.0)).cyan()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            workflow_name,
            total_steps,
        } => format!(
            "{} Starting workflow {} ({}) with {} step(s)",
            ROCKET,
            style(workflow_name).bold(),
            style(&run_id.to_string()[..8]).dim(),
            total_steps
        ),
        ExecutionEvent::StepStarted {
            name,
            index,
            total,
            ..
        } => format!(
            "{} [{}/{}] {}",
            SPINNER,
            index + 1,
            total,
            style(name).cyan()
        ),
        ExecutionEvent::StepOutput { step_id, output } => format!(
            "{} Output from {}:\n{}",
            INFO,
            style(step_id).dim(),
            format_output(output, 40)
        ),
        ExecutionEvent::StepCompleted { step_id } => {
            format!("{} {}", CHECK, style(step_id).green())
        }
        ExecutionEvent::StepFailed { step_id, error, .. } => {
            format!("{} {}: {}", CROSS, style(step_id).red(), style(error).dim())
        }
        ExecutionEvent::StepSkipped { step_id, reason } => {
            format!("{} {} skipped: {}", INFO, style(step_id).dim(), reason)
        }
        ExecutionEvent::ServiceStarted {
            step_id,
            pid,
            ready_after_ms,
            log_path,
        } => {
            let readiness = match ready_after_ms {
                Some(ms) => format!("ready in {}ms", ms),
                None => "no readiness probe".to_string(),
            };
            let pid = pid.map_or("?".to_string(), |p| p.to_string());
            format!(
                "{} {} up (pid {}, {}), log: {}",
                GEAR,
                style(step_id).blue(),
                pid,
                readiness,
                style(log_path.display()).dim()
            )
        }
        ExecutionEvent::ServiceStopped {
            step_id,
            natural_exit,
        } => match natural_exit {
            Some(code) => format!(
                "{} service {} had already exited with code {}",
                WARN,
                style(step_id).yellow(),
                code
            ),
            None => format!("{} stopped service {}", INFO, style(step_id).dim()),
        },
        ExecutionEvent::RunCompleted { run_id, status } => {
            let status_str = match status {
                RunStatus::Completed => format!("{} completed", style("successfully").green()),
                RunStatus::Failed => style("failed").red().to_string(),
                other => other.to_string(),
            };
            format!(
                "{} Workflow ({}) {}",
                INFO,
                style(&run_id.to_string()[..8]).dim(),
                status_str
            )
        }
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}
