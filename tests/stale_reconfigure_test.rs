//! S3 (spec §8): after a variable edit, `generate_stale_sch_logs` raises
//! to_config/to_restart events for the affected entity, and
//! `from_stale_hosted_entities` turns those into a RECONFIGURE plan with the
//! `start -> restart` rewrite applied.

mod common;

use tdp_lib::dag::DagEngine;
use tdp_lib::deployment::planner::from_stale_hosted_entities;
use tdp_lib::deployment::DeploymentType;
use tdp_lib::entities::ServiceComponentName;
use tdp_lib::status::StatusLog;
use tdp_lib::variables::ClusterVariables;

#[test]
fn variable_edit_produces_stale_events_and_a_reconfigure_plan() {
    let dir = tempfile::tempdir().unwrap();
    let spec = common::CollectionSpec {
        name: "core",
        dag_yaml: "- name: serv_comp_config\n  depends_on: []\n\
            - name: serv_comp_start\n  depends_on: [serv_comp_config]\n",
        playbooks: &[
            ("serv_comp_config", "- hosts: h1\n"),
            ("serv_comp_start", "- hosts: h1\n"),
            ("serv_comp_restart", "- hosts: h1\n"),
        ],
    };
    let collections = common::build_collections(dir.path(), &[spec]);
    let dag = DagEngine::build(collections.dag_operations()).unwrap();

    let default_vars = dir.path().join("core").join("tdp_vars_defaults").join("serv");
    std::fs::create_dir_all(&default_vars).unwrap();
    std::fs::write(default_vars.join("serv.yml"), "enabled: true\n").unwrap();
    std::fs::write(default_vars.join("comp.yml"), "replicas: 1\n").unwrap();

    let tdp_vars = dir.path().join("tdp_vars");
    let cluster_variables = ClusterVariables::initialize(&collections, &tdp_vars, &[]).unwrap();
    let initial_version = cluster_variables
        .get("serv")
        .unwrap()
        .version()
        .unwrap()
        .to_string();

    let overrides = dir.path().join("overrides");
    std::fs::create_dir_all(&overrides).unwrap();
    std::fs::write(overrides.join("comp.yml"), "replicas: 2\n").unwrap();
    cluster_variables
        .get("serv")
        .unwrap()
        .update_from_variables_folder("bump replicas", &overrides)
        .unwrap();

    let status_log = StatusLog::new();
    let deployed = vec![(
        ServiceComponentName::Component(
            tdp_lib::types::ServiceName::new("serv").unwrap(),
            tdp_lib::types::ComponentName::new("comp").unwrap(),
        ),
        initial_version,
    )];
    let stale_ids = status_log.generate_stale_sch_logs(&cluster_variables, &deployed);
    assert_eq!(stale_ids.len(), 2);

    let stale: Vec<_> = status_log
        .find_statuses(None, None, None, Some(true), None)
        .into_iter()
        .map(|(entity, status)| (entity.name, entity.host, (&status).into()))
        .collect();

    let plan = from_stale_hosted_entities(&collections, &dag, &stale, None, 1).unwrap();
    assert_eq!(plan.deployment_type, DeploymentType::Reconfigure);
    // The planner expresses a `to_restart` entity as its `_restart`
    // operation directly (spec's "start -> restart rewrite"), not as the
    // `_start` operation name.
    let names: Vec<&str> = plan.operations.iter().map(|op| op.operation.as_str()).collect();
    assert_eq!(names, vec!["serv_comp_config", "serv_comp_restart"]);

    // Idempotence (invariant 5): calling generate_stale_sch_logs again with
    // nothing new modified produces no further events.
    let more = status_log.generate_stale_sch_logs(&cluster_variables, &deployed);
    assert!(more.is_empty());
}
