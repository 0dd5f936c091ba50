//! Test: Environment Exports - state handed from step to step

use crate::helpers::*;

/// Variables a step appends to the export file reach every later step
#[tokio::test]
async fn test_exported_variables_reach_later_steps() {
    let yaml = r#"
name: "Test: Exports"

steps:
  - id: "locate"
    run: './ci/locate-build-dir.sh >> "$CONVEYOR_ENV"'

  - id: "build"
    run: "make -C $BUILD_DIR"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_export("locate-build-dir", "BUILD_DIR=devel");
    let calls = shell.calls();

    let result = run_workflow_with_mock(&mut workflow, shell).await;
    assert_run_completed(&result);

    let calls = calls.lock().unwrap();
    assert_eq!(calls[1].env.get("BUILD_DIR"), Some(&"devel".to_string()));
    // The exporting step itself never sees its own export
    assert_eq!(calls[0].env.get("BUILD_DIR"), None);
}

/// When the same key is exported twice, the later line wins
#[tokio::test]
async fn test_later_exports_override_earlier_ones() {
    let yaml = r#"
name: "Test: Export Precedence"

steps:
  - id: "pick-default"
    run: './ci/pick-default-planner.sh >> "$CONVEYOR_ENV"'

  - id: "pick-override"
    run: './ci/pick-override-planner.sh >> "$CONVEYOR_ENV"'

  - id: "plan"
    run: "bin/plan --arm left"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new()
        .with_export("pick-default-planner", "PLANNER=kdl")
        .with_export("pick-override-planner", "PLANNER=trac_ik");
    let calls = shell.calls();

    let result = run_workflow_with_mock(&mut workflow, shell).await;
    assert_run_completed(&result);

    let calls = calls.lock().unwrap();
    assert_eq!(calls[2].env.get("PLANNER"), Some(&"trac_ik".to_string()));

    // Both lines are still on file, in append order
    assert_eq!(result.exported_env(), "PLANNER=kdl\nPLANNER=trac_ik\n");
}

/// A step's own env block beats anything exported earlier
#[tokio::test]
async fn test_step_env_beats_exported_env() {
    let yaml = r#"
name: "Test: Env Layering"

steps:
  - id: "detect"
    run: './ci/detect-sim-mode.sh >> "$CONVEYOR_ENV"'

  - id: "simulate"
    run: "bin/simulator"
    env:
      SIM_MODE: "gui"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_export("detect-sim-mode", "SIM_MODE=headless");
    let calls = shell.calls();

    let result = run_workflow_with_mock(&mut workflow, shell).await;
    assert_run_completed(&result);

    let calls = calls.lock().unwrap();
    assert_eq!(calls[1].env.get("SIM_MODE"), Some(&"gui".to_string()));
}

/// Workflow env and the runner's own variables are present in every step
#[tokio::test]
async fn test_workflow_env_and_runner_vars_are_present() {
    let yaml = r#"
name: "Test: Ambient Env"

env:
  ROS_DISTRO: "noetic"
  PARALLEL_JOBS: 4

steps:
  - id: "build"
    run: "catkin build -j$PARALLEL_JOBS"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new();
    let calls = shell.calls();

    let result = run_workflow_with_mock(&mut workflow, shell).await;
    assert_run_completed(&result);

    let calls = calls.lock().unwrap();
    let env = &calls[0].env;
    assert_eq!(env.get("ROS_DISTRO"), Some(&"noetic".to_string()));
    assert_eq!(env.get("PARALLEL_JOBS"), Some(&"4".to_string()));
    assert_eq!(
        env.get("CONVEYOR_WORKSPACE").map(String::as_str),
        result.workspace.root().to_str()
    );
    assert_eq!(
        env.get("CONVEYOR_ENV").map(String::as_str),
        result.workspace.env_file().to_str()
    );
}

/// Exports also flow into checkout steps
#[tokio::test]
async fn test_exports_reach_checkout_steps() {
    let yaml = r#"
name: "Test: Exports into Checkout"

steps:
  - id: "pick-ref"
    run: './ci/pick-ref.sh >> "$CONVEYOR_ENV"'

  - id: "sources"
    checkout:
      repository: "example/robot-stack"
      path: "src/robot-stack"
"#;

    let mut workflow = workflow_from_yaml(yaml);
    let shell = MockShell::new().with_export("pick-ref", "GIT_TRACE=1");
    let calls = shell.calls();

    let result = run_workflow_with_mock(&mut workflow, shell).await;
    assert_run_completed(&result);

    let calls = calls.lock().unwrap();
    let clone = calls
        .iter()
        .find(|c| c.label == "git clone")
        .expect("clone command recorded");
    assert_eq!(clone.env.get("GIT_TRACE"), Some(&"1".to_string()));
}
