use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use conveyor::cli::commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use conveyor::cli::live::LinePrinter;
use conveyor::cli::output::*;
use conveyor::cli::{Cli, Command};
use conveyor::core::config::WorkflowConfig;
use conveyor::core::RunStatus;
use conveyor::execution::{ExecutionEvent, RunEngine};
use conveyor::persistence::{create_summary, PersistenceBackend, RunSummary};
use conveyor::shell::{OutputCallback, SystemShell};
use conveyor::workspace::Workspace;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG overrides the default level
    let default_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(default_level.into()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, cli.clone()).await?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::List(cmd) => list_workflows(cmd).await?,
        Command::History(cmd) => show_history(cmd, cli.verbose).await?,
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn history_store() -> Result<Arc<dyn PersistenceBackend>> {
    use conveyor::persistence::SqliteRunStore;
    Ok(Arc::new(SqliteRunStore::with_default_path().await?))
}

#[cfg(not(feature = "sqlite"))]
async fn history_store() -> Result<Arc<dyn PersistenceBackend>> {
    use conveyor::persistence::InMemoryPersistence;
    tracing::warn!("built without the sqlite feature; run history will not persist");
    Ok(Arc::new(InMemoryPersistence::new()))
}

async fn run_workflow(cmd: &RunCommand, cli: Cli) -> Result<()> {
    // Load workflow config
    let config = WorkflowConfig::from_file(&cmd.file).context("Failed to load workflow")?;

    println!("{} Loaded workflow: {}", INFO, style(&config.name).bold());

    let mut workflow = config.to_workflow()?;

    // Extra variables land in the workflow environment
    for (key, value) in &cmd.env {
        workflow.env.insert(key.clone(), value.clone());
        println!(
            "{} Environment override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    // A simulated event must be permitted by the workflow's triggers;
    // a non-match is a clean no-op, not a failure.
    if let Some(event) = cmd.event {
        let branch = cmd.branch.as_deref().unwrap_or_default();
        if !workflow.permits(event, branch) {
            println!(
                "{} {} does not trigger on {} for branch '{}'",
                INFO,
                style(&workflow.name).bold(),
                event,
                branch
            );
            return Ok(());
        }
    }

    // Workspace: command line wins over the workflow file, which wins
    // over the per-workflow default location.
    let root = match cmd.workspace.as_deref() {
        Some(dir) => PathBuf::from(dir),
        None => match &workflow.workspace {
            Some(dir) => dir.clone(),
            None => Workspace::default_root(&workflow.name)?,
        },
    };
    let workspace = Workspace::new(root);
    workspace.prepare().context("Failed to prepare workspace")?;
    println!(
        "{} Workspace: {}",
        INFO,
        style(workspace.root().display()).dim()
    );

    let store: Option<Arc<dyn PersistenceBackend>> = if cmd.no_history {
        None
    } else {
        Some(history_store().await?)
    };

    let mut engine = RunEngine::new(SystemShell::new());

    let stream = cli.stream;
    let progress = if stream {
        None
    } else {
        Some(create_progress_bar(workflow.steps.len()))
    };

    match &progress {
        Some(bar) => {
            let bar = bar.clone();
            engine.add_event_handler(move |event| {
                match &event {
                    ExecutionEvent::StepStarted { name, .. } => bar.set_message(name.clone()),
                    ExecutionEvent::StepCompleted { .. }
                    | ExecutionEvent::StepFailed { .. }
                    | ExecutionEvent::StepSkipped { .. }
                    | ExecutionEvent::ServiceStarted { .. } => bar.inc(1),
                    _ => {}
                }
                bar.println(format_execution_event(&event));
            });
        }
        None => {
            // Output already streams live, so skip the buffered copy.
            engine.add_event_handler(|event| {
                if !matches!(event, ExecutionEvent::StepOutput { .. }) {
                    println!("{}", format_execution_event(&event));
                }
            });
        }
    }

    let printer = LinePrinter::new();
    let callback: Option<&dyn OutputCallback> = if stream { Some(&printer) } else { None };

    println!();
    let status = engine.execute(&mut workflow, &workspace, callback).await;

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    // Save to history
    if let Some(store) = &store {
        let summary = create_summary(&workflow);
        store.save_run(&summary).await?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.run_id.to_string()[..8]).dim()
        );
    }

    // Print final status
    if status == RunStatus::Completed {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&workflow.name).bold(),
            style("successfully").green()
        );
    } else {
        println!(
            "\n{} {} {}",
            CROSS,
            style(&workflow.name).bold(),
            style("failed").red()
        );
        std::process::exit(1);
    }

    Ok(())
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating workflow...", INFO);

    match WorkflowConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Steps: {}", style(config.steps.len()).cyan());
            println!(
                "  Env vars: {}",
                style(config.env_string_map().len()).cyan()
            );

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

async fn list_workflows(cmd: &ListCommand) -> Result<()> {
    let store = history_store().await?;
    let workflows = store.list_workflows().await?;

    if workflows.is_empty() {
        println!("{} No workflows found in history", INFO);
        return Ok(());
    }

    if cmd.json {
        let mut entries = Vec::new();
        for name in &workflows {
            let runs = store.list_runs(name).await?;
            entries.push(serde_json::json!({
                "name": name,
                "run_count": runs.len(),
            }));
        }
        let data = serde_json::json!({ "workflows": entries });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Workflows in history:", INFO);
    for name in &workflows {
        let runs = store.list_runs(name).await?;
        let completed = runs
            .iter()
            .filter(|r| r.status == RunStatus::Completed)
            .count();
        let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count();
        println!(
            "  {} ({} runs: {} succeeded, {} failed)",
            style(name).bold(),
            style(runs.len()).cyan(),
            style(completed).green(),
            style(failed).red()
        );
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand, verbose: bool) -> Result<()> {
    let store = history_store().await?;

    // A specific run by ID
    if let Some(run_id_str) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id_str).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, verbose)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let runs: Vec<RunSummary> = if let Some(workflow_name) = &cmd.workflow {
        store
            .list_runs(workflow_name)
            .await?
            .into_iter()
            .take(cmd.limit)
            .collect()
    } else {
        let workflows = store.list_workflows().await?;
        let mut all_runs = Vec::new();
        for name in &workflows {
            all_runs.extend(store.list_runs(name).await?);
        }
        all_runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all_runs.into_iter().take(cmd.limit).collect()
    };

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    println!("{} Run history (showing latest {}):", INFO, cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, verbose: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{} completed, {} failed, {} skipped)",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.completed_steps,
        summary.total_steps,
        summary.failed_steps,
        summary.skipped_steps
    );

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
