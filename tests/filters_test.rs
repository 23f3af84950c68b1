//! S4/S5 (spec §8): the `restart` flag rewrites `_start` operations to
//! `_restart`, and a glob filter restricts the planned set to matching names.

mod common;

use tdp_lib::dag::DagEngine;
use tdp_lib::deployment::planner::from_dag;

#[test]
fn restart_flag_rewrites_start_to_restart() {
    let dir = tempfile::tempdir().unwrap();
    let collections = common::build_collections(dir.path(), &[common::minimal_dag_spec()]);
    let dag = DagEngine::build(collections.dag_operations()).unwrap();

    let plan = from_dag(
        &dag,
        None,
        Some(&["serv_init".to_string()]),
        None,
        true,
        false,
        false,
        None,
        1,
    )
    .unwrap();

    let names: Vec<&str> = plan.operations.iter().map(|op| op.operation.as_str()).collect();
    assert!(names.contains(&"serv_comp_restart"));
    assert!(names.contains(&"serv_restart"));
    assert!(!names.iter().any(|n| n.ends_with("_start")));
    assert!(names.contains(&"serv_comp_install"));
    assert!(names.contains(&"serv_comp_config"));
    assert!(names.contains(&"serv_comp_init"));
}

#[test]
fn glob_filter_restricts_to_matching_names() {
    let dir = tempfile::tempdir().unwrap();
    let collections = common::build_collections(dir.path(), &[common::minimal_dag_spec()]);
    let dag = DagEngine::build(collections.dag_operations()).unwrap();

    let plan = from_dag(
        &dag,
        None,
        Some(&["serv_init".to_string()]),
        Some(("*_install", false)),
        false,
        false,
        false,
        None,
        1,
    )
    .unwrap();

    let names: Vec<&str> = plan.operations.iter().map(|op| op.operation.as_str()).collect();
    assert!(names.iter().all(|n| n.ends_with("_install")));
    assert!(names.contains(&"serv_comp_install"));
    assert!(names.contains(&"serv_install"));
}
