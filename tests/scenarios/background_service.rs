//! Test: Background Services - launch, readiness probes, and shutdown

use crate::helpers::*;
use conveyor::core::StepState;
use conveyor::execution::ExecutionEvent;

/// A background service stays up for later steps and is stopped after the
/// last one finishes
#[tokio::test]
async fn test_service_stays_up_for_later_steps() {
    let yaml = r#"
name: "Test: Background Service"

steps:
  - id: "roscore"
    run: "roscore"
    background: true
    readiness:
      delay_secs: 0

  - id: "probe"
    run: "rostopic list"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_output("rostopic list", "/rosout\n");
    let stopped = shell.stopped();

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_completed(&result);
    assert_service_started(&result, "roscore");
    assert_step_completed(&result, "probe", "/rosout");

    // Shut down exactly once, after the run
    assert_eq!(
        stopped.lock().unwrap().as_slice(),
        &["step roscore".to_string()]
    );

    let stop_index = result
        .events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::ServiceStopped { .. }))
        .expect("service stop event");
    let last_step_index = result
        .events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::StepCompleted { step_id } if step_id == "probe"))
        .expect("probe completion event");
    assert!(stop_index > last_step_index);
}

/// A log-pattern probe holds the run until the service says it is ready
#[tokio::test]
async fn test_log_pattern_probe_gates_the_next_step() {
    let yaml = r#"
name: "Test: Log Readiness"

steps:
  - id: "ik-server"
    run: "bin/ik-server --port 9090"
    background: true
    readiness:
      pattern: "listening on port \\d+"
      use_regex: true
      timeout_secs: 5

  - id: "solve"
    run: "bin/ik-client --check"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell =
        MockShell::new().with_service_log("ik-server", "booting\nlistening on port 9090\n");

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_completed(&result);
    match result.get_step_state("ik-server") {
        Some(StepState::Service {
            ready_after_ms,
            pid,
            ..
        }) => {
            assert!(ready_after_ms.is_some(), "probe should report how long readiness took");
            assert_eq!(*pid, Some(4242));
        }
        other => panic!("expected a service state, got {:?}", other),
    }
    assert_execution_order(&result, &["ik-server", "solve"]);
}

/// A path probe waits for the service to drop its ready file
#[tokio::test]
async fn test_path_probe_waits_for_the_ready_file() {
    let yaml = r#"
name: "Test: Path Readiness"

steps:
  - id: "sim"
    run: "bin/simulator --headless"
    background: true
    readiness:
      path: "sim/ready"
      timeout_secs: 5

  - id: "spawn-robot"
    run: "bin/spawn-model pr2"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_ready_file("simulator", "sim/ready");

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_completed(&result);
    assert_service_started(&result, "sim");
    assert!(result.workspace.root().join("sim/ready").exists());
}

/// A service that dies before its probe passes fails the step
#[tokio::test]
async fn test_service_that_dies_fails_the_step() {
    let yaml = r#"
name: "Test: Dead Service"

steps:
  - id: "ik-server"
    run: "bin/ik-server --port 9090"
    background: true
    readiness:
      pattern: "ready"
      timeout_secs: 5

  - id: "solve"
    run: "bin/ik-client --check"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_dead_service(1);

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_failed(&result);
    assert_step_failed(&result, "ik-server", "exited with code 1 before becoming ready");
    assert_step_skipped(&result, "solve");

    match result.get_step_state("ik-server") {
        Some(StepState::Failed { exit_code, .. }) => assert_eq!(*exit_code, Some(1)),
        other => panic!("expected a failed state, got {:?}", other),
    }
}

/// A probe that never passes times out and fails the step
#[tokio::test]
async fn test_readiness_timeout_fails_the_step() {
    let yaml = r#"
name: "Test: Readiness Timeout"

steps:
  - id: "sim"
    run: "bin/simulator --headless"
    background: true
    readiness:
      path: "never/created"
      timeout_secs: 1

  - id: "after"
    run: "echo unreachable"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new();

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_failed(&result);
    assert_step_failed(&result, "sim", "not ready after 1 seconds");
    assert_step_skipped(&result, "after");
}

/// Without a probe the run proceeds immediately, readiness unknown
#[tokio::test]
async fn test_service_without_probe_proceeds_immediately() {
    let yaml = r#"
name: "Test: No Probe"

steps:
  - id: "server"
    run: "bin/ik-server"
    background: true

  - id: "after"
    run: "echo next"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let result = run_workflow_with_mock(&mut workflow, MockShell::new()).await;

    assert_run_completed(&result);

    let started: Vec<Option<u64>> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::ServiceStarted { ready_after_ms, .. } => Some(*ready_after_ms),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![None]);
}

/// Services stop in reverse launch order
#[tokio::test]
async fn test_services_stop_in_reverse_launch_order() {
    let yaml = r#"
name: "Test: Shutdown Order"

steps:
  - id: "roscore"
    run: "roscore"
    background: true
    readiness:
      delay_secs: 0

  - id: "rosbridge"
    run: "roslaunch rosbridge_server rosbridge_websocket.launch"
    background: true
    readiness:
      delay_secs: 0

  - id: "check"
    run: "rostopic list"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new();
    let stopped = shell.stopped();

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_completed(&result);
    assert_eq!(result.service_steps(), vec!["roscore", "rosbridge"]);
    assert_eq!(
        stopped.lock().unwrap().as_slice(),
        &["step rosbridge".to_string(), "step roscore".to_string()]
    );
}

/// Services are stopped even when a later step fails
#[tokio::test]
async fn test_services_stop_when_a_step_fails() {
    let yaml = r#"
name: "Test: Shutdown on Failure"

steps:
  - id: "roscore"
    run: "roscore"
    background: true
    readiness:
      delay_secs: 0

  - id: "test"
    run: "catkin run_tests"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_failure("catkin run_tests", 1, "tests failed");
    let stopped = shell.stopped();

    let result = run_workflow_with_mock(&mut workflow, shell).await;

    assert_run_failed(&result);
    assert_eq!(
        stopped.lock().unwrap().as_slice(),
        &["step roscore".to_string()]
    );
}
