//! S1 (spec §8): plan a full install/config/start/init chain from the DAG
//! and run it to completion against a successful executor.

mod common;

use tdp_lib::dag::DagEngine;
use tdp_lib::deployment::planner::from_dag;
use tdp_lib::deployment::runner::{DeploymentRunner, Executor, ExecutorResult};
use tdp_lib::deployment::{DeploymentState, OperationState};
use tdp_lib::status::StatusLog;

struct SuccessExecutor;

impl Executor for SuccessExecutor {
    fn execute(&mut self, _playbook_path: Option<&str>, _host: Option<&str>, _extra_vars: &[String]) -> ExecutorResult {
        ExecutorResult { success: true, log_bytes: b"ok".to_vec() }
    }
}

#[test]
fn minimal_dag_run_succeeds_in_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let collections = common::build_collections(dir.path(), &[common::minimal_dag_spec()]);
    let dag = DagEngine::build(collections.dag_operations()).unwrap();

    let mut deployment = from_dag(
        &dag,
        None,
        Some(&["serv_init".to_string()]),
        None,
        false,
        false,
        false,
        None,
        1,
    )
    .unwrap();

    let planned_names: Vec<&str> = deployment.operations.iter().map(|op| op.operation.as_str()).collect();
    assert_eq!(
        planned_names,
        vec![
            "serv_comp_install",
            "serv_install",
            "serv_comp_config",
            "serv_config",
            "serv_comp_start",
            "serv_start",
            "serv_comp_init",
            "serv_init",
        ]
    );

    let status_log = StatusLog::new();
    let playbooks = collections.playbooks().clone();
    let playbook_lookup = move |name: &str| playbooks.get(name).map(|p| p.path.to_string_lossy().into_owned());
    let version_lookup = |_: &str| Some("v1".to_string());

    let mut executor = SuccessExecutor;
    let mut tick = 0u64;
    {
        let mut runner =
            DeploymentRunner::new(&mut deployment, &status_log, playbook_lookup, version_lookup).unwrap();
        while runner.step(&mut executor, tick).is_some() {
            tick += 1;
        }
    }

    assert_eq!(deployment.state, DeploymentState::Success);
    assert!(deployment.operations.iter().all(|op| op.state == OperationState::Success));

    let events = status_log.events();
    assert!(events.iter().any(|e| e.configured_version.is_some()));
    assert!(events.iter().any(|e| e.running_version.is_some()));
}
