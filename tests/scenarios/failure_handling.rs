//! Test: Failure Handling - the first failure halts the run

use crate::helpers::*;
use conveyor::core::StepState;
use conveyor::execution::ExecutionEvent;
use std::time::Duration;

/// A failing step stops the run; everything after it is skipped
#[tokio::test]
async fn test_first_failure_halts_the_run() {
    let yaml = r#"
name: "Test: Halt on Failure"

steps:
  - id: "deps"
    run: "rosdep install --from-paths src --ignore-src -y"

  - id: "build"
    run: "catkin build"

  - id: "test"
    run: "catkin run_tests"

  - id: "report"
    run: "catkin_test_results"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_failure("catkin build", 2, "error: compilation failed");
    let calls = shell.calls();

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_failed(&result);
    assert_execution_order(&result, &["deps", "build"]);
    assert_step_failed(&result, "build", "exited with code 2");
    assert_step_skipped(&result, "test");
    assert_step_skipped(&result, "report");

    // Only the steps before the halt ever reached the shell
    assert_eq!(scripts_run(&calls).len(), 2);

    assert_eq!(result.completed_steps(), vec!["deps"]);
    assert_eq!(result.workflow.state.failed_steps, 1);
    assert_eq!(result.workflow.state.skipped_steps, 2);
}

/// The failure message names the command and carries its stderr
#[tokio::test]
async fn test_failure_error_includes_stderr() {
    let yaml = r#"
name: "Test: Failure Detail"

steps:
  - id: "build"
    run: "catkin build"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_failure(
        "catkin build",
        2,
        "error: package 'robot_stack' not found",
    );

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_failed(&result);
    let error = result.get_step_error("build").expect("build should fail");
    assert!(error.starts_with("step build"), "error was: {}", error);
    assert!(error.contains("exited with code 2"), "error was: {}", error);
    assert!(
        error.contains("package 'robot_stack' not found"),
        "error was: {}",
        error
    );
}

/// Skip reasons name the step that halted the run
#[tokio::test]
async fn test_skip_reason_names_the_failed_step() {
    let yaml = r#"
name: "Test: Skip Reason"

steps:
  - id: "build"
    run: "catkin build"

  - id: "test"
    run: "catkin run_tests"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_failure("catkin build", 1, "");

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    match result.get_step_state("test") {
        Some(StepState::Skipped { reason }) => assert_eq!(reason, "step 'build' failed"),
        other => panic!("expected a skipped state, got {:?}", other),
    }
}

/// Death by signal is a failure with no exit code
#[tokio::test]
async fn test_signal_death_is_a_failure() {
    let yaml = r#"
name: "Test: Signal Death"

steps:
  - id: "sim"
    run: "run-simulation --headless"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_signal_death("run-simulation");

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_failed(&result);
    assert_step_failed(&result, "sim", "terminated by signal");
    match result.get_step_state("sim") {
        Some(StepState::Failed { exit_code, .. }) => assert_eq!(*exit_code, None),
        other => panic!("expected a failed state, got {:?}", other),
    }
}

/// A step that outlives its timeout fails and halts the run
#[tokio::test]
async fn test_step_timeout_fails_the_step() {
    let yaml = r#"
name: "Test: Timeout"

steps:
  - id: "hang"
    run: "roslaunch simulation.launch"
    timeout_secs: 1

  - id: "after"
    run: "echo unreachable"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_delay("roslaunch", Duration::from_secs(5));

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_failed(&result);
    assert_step_failed(&result, "hang", "Timeout after 1 seconds");
    assert_step_skipped(&result, "after");
}

/// The failed event carries the exit code for reporting
#[tokio::test]
async fn test_failed_event_carries_exit_code() {
    let yaml = r#"
name: "Test: Failure Event"

steps:
  - id: "build"
    run: "catkin build"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_failure("catkin build", 2, "boom");

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    let failed: Vec<(String, Option<i32>)> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepFailed {
                step_id, exit_code, ..
            } => Some((step_id.clone(), *exit_code)),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![("build".to_string(), Some(2))]);
}
