//! Test: Checkout Steps - parameterized git checkouts in the workspace

use crate::helpers::*;

/// A checkout into an empty workspace clones, pins the ref, and pulls
/// submodules, in that order
#[tokio::test]
async fn test_fresh_checkout_runs_the_full_plan() {
    let yaml = r#"
name: "Test: Fresh Checkout"

steps:
  - id: "sources"
    name: "Check out sources"
    checkout:
      repository: "example/robot-stack"
      path: "src/robot-stack"
      ref: "dev"
      submodules: true
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new();
    let calls = shell.calls();

    let result = run_workflow_with_mock(&mut workflow, shell).await;
    assert_run_completed(&result);

    let lines = commands_run(&calls);
    assert_eq!(lines.len(), 3);
    assert!(
        lines[0].starts_with("git clone https://github.com/example/robot-stack.git"),
        "first command was: {}",
        lines[0]
    );
    assert_eq!(lines[1], "git checkout --force dev");
    assert_eq!(lines[2], "git submodule update --init --recursive");

    // Checkout commands run with the same layered environment as scripts
    let calls = calls.lock().unwrap();
    assert!(calls.iter().all(|c| c.env.contains_key("CONVEYOR_WORKSPACE")));
}

/// A destination that already holds a clone is updated, not re-cloned
#[tokio::test]
async fn test_existing_clone_fetches_instead_of_cloning() {
    let yaml = r#"
name: "Test: Checkout Update"

steps:
  - id: "sources"
    checkout:
      repository: "example/robot-stack"
      path: "src/robot-stack"
      ref: "dev"
      submodules: true
"#;

    let ws = temp_workspace();
    let dest = ws.workspace.root().join("src/robot-stack");
    std::fs::create_dir_all(dest.join(".git")).expect("seed existing clone");

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new();
    let calls = shell.calls();

    let result = run_workflow_in(&ws, &mut workflow, shell).await;
    assert_run_completed(&result);

    assert_eq!(
        commands_run(&calls),
        vec![
            "git fetch --tags origin",
            "git checkout --force dev",
            "git submodule update --init --recursive"
        ]
    );

    // Update commands run inside the existing clone
    let calls = calls.lock().unwrap();
    assert_eq!(calls[0].cwd, dest);
}

/// A failing git command fails the step and halts the run
#[tokio::test]
async fn test_checkout_failure_halts_the_run() {
    let yaml = r#"
name: "Test: Checkout Failure"

steps:
  - id: "sources"
    checkout:
      repository: "example/missing"
      path: "src/missing"
      ref: "dev"

  - id: "build"
    run: "catkin build"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_failure(
        "git clone",
        128,
        "fatal: repository 'https://github.com/example/missing.git' not found",
    );
    let calls = shell.calls();

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_failed(&result);
    let error = result.get_step_error("sources").expect("sources should fail");
    assert!(error.starts_with("git clone"), "error was: {}", error);
    assert!(error.contains("fatal: repository"), "error was: {}", error);
    assert_step_skipped(&result, "build");

    // The plan stops at the failing clone; no checkout follows
    assert_eq!(commands_run(&calls).len(), 1);
}

/// An existing destination that is not a clone is refused outright
#[tokio::test]
async fn test_non_repo_destination_is_rejected() {
    let yaml = r#"
name: "Test: Occupied Destination"

steps:
  - id: "sources"
    checkout:
      repository: "example/robot-stack"
      path: "src/robot-stack"
"#;

    let ws = temp_workspace();
    let dest = ws.workspace.root().join("src/robot-stack");
    std::fs::create_dir_all(&dest).expect("seed destination");
    std::fs::write(dest.join("stray.txt"), "not a clone").expect("seed stray file");

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new();
    let calls = shell.calls();

    let result = run_workflow_in(&ws, &mut workflow, shell).await;

    assert_run_failed(&result);
    assert_step_failed(&result, "sources", "not a git repository");

    // Git is never invoked against a directory we cannot account for
    assert!(commands_run(&calls).is_empty());
}

/// Checkouts without a ref or submodules clone and stop there
#[tokio::test]
async fn test_minimal_checkout_only_clones() {
    let yaml = r#"
name: "Test: Minimal Checkout"

steps:
  - id: "sources"
    checkout:
      repository: "example/robot-stack"
      path: "src/robot-stack"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new();
    let calls = shell.calls();

    let result = run_workflow_with_mock(&mut workflow, shell).await;
    assert_run_completed(&result);

    let lines = commands_run(&calls);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("git clone"));
}
