//! Deployment planner (C6): pure factories that turn a DAG slice, an explicit
//! operation list, or a set of stale entities into a `PLANNED`
//! [`DeploymentModel`]. The planner never touches status or variables.
//!
//! Grounded on `tdp/core/models/deployment_model.py`'s `from_dag`,
//! `from_operations`, `from_operations_hosts_vars`, `from_stale_hosted_entities`,
//! `from_failed_deployment`, and the module-level `_get_reconfigure_operation_hosts`.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::aggregator::Collections;
use crate::dag::{sort_operation_host_pairs, DagEngine};
use crate::entities::ServiceComponentName;
use crate::error::FixSuggestion;

use super::model::{DeploymentModel, DeploymentState, DeploymentType, OperationModel, OperationState};

/// Reserved synthetic operation injected between rolling-restart steps.
/// Grounded on spec §6's "Reserved operation name".
pub const WAIT_SLEEP_OPERATION_NAME: &str = "wait_sleep";

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no operation matched the given sources/targets/filter")]
    NoOperationMatch,
    #[error("restart and stop are mutually exclusive")]
    RestartStopMutuallyExclusive,
    #[error("nothing to reconfigure: no stale hosted entity requires an operation")]
    NothingToReconfigure,
    #[error("nothing to resume: the failed deployment has no failed operation")]
    NothingToResume,
    #[error("deployment {0} is not in a resumable state (must be FAILURE with operations)")]
    UnsupportedDeploymentType(u64),
    #[error("operation '{0}' no longer exists in the current collections")]
    MissingOperation(String),
    #[error("host '{host}' is not valid for operation '{operation}'")]
    MissingHostForOperation { operation: String, host: String },
    #[error(transparent)]
    Graph(#[from] crate::dag::GraphError),
}

impl FixSuggestion for PlanError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            PlanError::NoOperationMatch => {
                Some("widen the sources/targets/filter, or check the filter pattern syntax")
            }
            PlanError::RestartStopMutuallyExclusive => {
                Some("pass only one of --restart or --stop")
            }
            PlanError::MissingHostForOperation { .. } => {
                Some("the host must be listed in the operation's playbook hosts")
            }
            PlanError::MissingOperation(_) => {
                Some("the collections changed since the deployment ran; re-plan from scratch")
            }
            _ => None,
        }
    }
}

fn wait_sleep_operation(order: u32, seconds: u64) -> OperationModel {
    OperationModel::planned(
        order,
        WAIT_SLEEP_OPERATION_NAME.to_string(),
        None,
        vec![format!("wait_sleep_seconds={seconds}")],
    )
}

/// Assigns `operation_order` 1..N, inserting a `wait_sleep` step after every
/// restart operation that has non-empty hosts, when `rolling_interval` is set.
fn assign_order_with_rolling_wait(
    rows: Vec<(String, Option<String>, Vec<String>)>,
    rolling_interval: Option<u64>,
) -> Vec<OperationModel> {
    let mut operations = Vec::new();
    let mut order = 1u32;
    for (name, host, extra_vars) in rows {
        let is_restart = name.ends_with("_restart");
        let has_host = host.is_some();
        operations.push(OperationModel::planned(order, name, host, extra_vars));
        order += 1;
        if let Some(seconds) = rolling_interval {
            if is_restart && has_host {
                operations.push(wait_sleep_operation(order, seconds));
                order += 1;
            }
        }
    }
    operations
}

/// Plan from a DAG slice (spec §4.6, `from_dag`).
pub fn from_dag(
    dag: &DagEngine,
    sources: Option<&[String]>,
    targets: Option<&[String]>,
    filter: Option<(&str, bool)>, // (pattern, is_regex); default glob
    restart: bool,
    reverse: bool,
    stop: bool,
    rolling_interval: Option<u64>,
    deployment_id: u64,
) -> Result<DeploymentModel, PlanError> {
    if restart && stop {
        return Err(PlanError::RestartStopMutuallyExclusive);
    }

    let mut operations = dag.get_operations(sources, targets, restart, stop);

    if let Some((pattern, is_regex)) = filter {
        operations = if is_regex {
            dag.filter_operations_regex(&operations, pattern)
                .map_err(|_| PlanError::NoOperationMatch)?
        } else {
            dag.filter_operations_glob(&operations, pattern)
        };
    }

    if operations.is_empty() {
        return Err(PlanError::NoOperationMatch);
    }

    if reverse {
        operations.reverse();
    }

    let mut rows: Vec<(String, Option<String>, Vec<String>)> = Vec::new();
    for op in operations {
        let name = op.name.as_str().to_string();
        let is_restart = op.name.action.as_str() == "restart";
        if is_restart && rolling_interval.is_some() && !op.host_names.is_empty() {
            for host in &op.host_names {
                rows.push((name.clone(), Some(host.clone()), Vec::new()));
            }
        } else {
            rows.push((name, None, Vec::new()));
        }
    }
    let operations = assign_order_with_rolling_wait(rows, rolling_interval);

    Ok(DeploymentModel::planned(deployment_id, DeploymentType::Dag, operations))
}

/// Plan from an explicit list of operation names (spec §4.6, `from_operations`).
pub fn from_operations(
    collections: &Collections,
    names: &[String],
    hosts: &[String],
    extra_vars: &[String],
    rolling_interval: Option<u64>,
    deployment_id: u64,
) -> Result<DeploymentModel, PlanError> {
    let all_operations = collections.operations();
    let mut rows = Vec::new();

    for name in names {
        let operation = all_operations
            .get(name)
            .ok_or_else(|| PlanError::MissingOperation(name.clone()))?;

        if !hosts.is_empty() {
            for host in hosts {
                if !operation.host_names.is_empty() && !operation.host_names.contains(host) {
                    return Err(PlanError::MissingHostForOperation {
                        operation: name.clone(),
                        host: host.clone(),
                    });
                }
                rows.push((name.clone(), Some(host.clone()), extra_vars.to_vec()));
            }
            continue;
        }

        let is_restart = operation.name.action.as_str() == "restart";
        if is_restart && rolling_interval.is_some() && !operation.host_names.is_empty() {
            for host in &operation.host_names {
                rows.push((name.clone(), Some(host.clone()), extra_vars.to_vec()));
            }
        } else {
            rows.push((name.clone(), None, extra_vars.to_vec()));
        }
    }

    if rows.is_empty() {
        return Err(PlanError::NoOperationMatch);
    }

    let operations = assign_order_with_rolling_wait(rows, rolling_interval);
    Ok(DeploymentModel::planned(
        deployment_id,
        DeploymentType::Operations,
        operations,
    ))
}

/// Plan from explicit `(name, host?, extra_vars?)` triples, in the order
/// given (spec §4.6, `from_operations_hosts_vars`, CUSTOM deployment type).
pub fn from_operations_hosts_vars(
    collections: &Collections,
    triples: &[(String, Option<String>, Vec<String>)],
    deployment_id: u64,
) -> Result<DeploymentModel, PlanError> {
    if triples.is_empty() {
        return Err(PlanError::NoOperationMatch);
    }
    let all_operations = collections.operations();
    let mut operations = Vec::new();
    for (order, (name, host, extra_vars)) in triples.iter().enumerate() {
        let operation = all_operations
            .get(name)
            .ok_or_else(|| PlanError::MissingOperation(name.clone()))?;
        if let Some(host) = host {
            if !operation.host_names.is_empty() && !operation.host_names.contains(host) {
                return Err(PlanError::MissingHostForOperation {
                    operation: name.clone(),
                    host: host.clone(),
                });
            }
        }
        operations.push(OperationModel::planned(
            (order + 1) as u32,
            name.clone(),
            host.clone(),
            extra_vars.clone(),
        ));
    }
    Ok(DeploymentModel::planned(deployment_id, DeploymentType::Custom, operations))
}

/// Plan a RECONFIGURE deployment from a set of stale hosted-entity statuses
/// (spec §4.6, `from_stale_hosted_entities`). `to_config` requires
/// `<entity>_config`; `to_restart` requires `<entity>_restart` (the start
/// action rewritten to restart, the way the DAG engine rewrites it for any
/// restart-driven retrieval).
pub fn from_stale_hosted_entities(
    collections: &Collections,
    dag: &DagEngine,
    stale: &[(ServiceComponentName, Option<String>, SCHStatusLogEventLike)],
    rolling_interval: Option<u64>,
    deployment_id: u64,
) -> Result<DeploymentModel, PlanError> {
    let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
    let mut pairs: Vec<(String, Option<String>)> = Vec::new();

    for (entity, host, status) in stale {
        if status.to_config {
            let name = format!("{entity}_config");
            if seen.insert((name.clone(), host.clone())) {
                pairs.push((name, host.clone()));
            }
        }
        if status.to_restart {
            let name = format!("{entity}_restart");
            if seen.insert((name.clone(), host.clone())) {
                pairs.push((name, host.clone()));
            }
        }
    }

    if pairs.is_empty() {
        return Err(PlanError::NothingToReconfigure);
    }

    let all_operations = collections.operations();
    for (name, _) in &pairs {
        if !all_operations.contains_key(name) {
            return Err(PlanError::MissingOperation(name.clone()));
        }
    }

    // Primary order: DAG topological position, keyed by (service_priority,
    // name); ties (same operation on multiple hosts) broken by
    // `_get_reconfigure_operation_hosts`'s `"{name}_{host}"` ordering.
    sort_operation_host_pairs(&mut pairs);
    let dag_order = dag.get_all_operations();
    let name_rank: HashMap<&str, usize> = dag_order
        .iter()
        .enumerate()
        .map(|(i, op)| (op.name.as_str(), i))
        .collect();
    pairs.sort_by_key(|(name, host)| {
        (
            name_rank.get(name.as_str()).copied().unwrap_or(usize::MAX),
            host.clone(),
        )
    });

    let rows: Vec<(String, Option<String>, Vec<String>)> = pairs
        .into_iter()
        .map(|(name, host)| (name, host, Vec::new()))
        .collect();
    let operations = assign_order_with_rolling_wait(rows, rolling_interval);
    Ok(DeploymentModel::planned(
        deployment_id,
        DeploymentType::Reconfigure,
        operations,
    ))
}

/// Minimal view of a stale status needed by the reconfigure planner, so this
/// module doesn't need to depend on the full `HostedEntityStatus` shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct SCHStatusLogEventLike {
    pub to_config: bool,
    pub to_restart: bool,
}

impl From<&crate::entities::HostedEntityStatus> for SCHStatusLogEventLike {
    fn from(status: &crate::entities::HostedEntityStatus) -> Self {
        SCHStatusLogEventLike {
            to_config: status.to_config,
            to_restart: status.to_restart,
        }
    }
}

/// Resume a failed deployment from its first failed operation onward (spec
/// §4.6, `from_failed_deployment`, RESUME deployment type).
pub fn from_failed_deployment(
    collections: &Collections,
    failed: &DeploymentModel,
    deployment_id: u64,
) -> Result<DeploymentModel, PlanError> {
    if failed.state != DeploymentState::Failure || failed.operations.is_empty() {
        return Err(PlanError::UnsupportedDeploymentType(failed.id));
    }

    let first_failed = failed
        .operations
        .iter()
        .position(|op| op.state == OperationState::Failure)
        .ok_or(PlanError::NothingToResume)?;

    let all_operations = collections.operations();
    let mut operations = Vec::new();
    for (order, op) in failed.operations[first_failed..].iter().enumerate() {
        if op.operation != WAIT_SLEEP_OPERATION_NAME && !all_operations.contains_key(&op.operation)
        {
            return Err(PlanError::MissingOperation(op.operation.clone()));
        }
        operations.push(OperationModel::planned(
            (order + 1) as u32,
            op.operation.clone(),
            op.host.clone(),
            op.extra_vars.clone(),
        ));
    }

    Ok(DeploymentModel::planned(deployment_id, DeploymentType::Resume, operations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Operation;
    use crate::entities::OperationName;
    use std::collections::HashMap;

    fn op(name: &str, hosts: &[&str]) -> (String, Operation) {
        (
            name.to_string(),
            Operation {
                name: OperationName::parse(name).unwrap(),
                collection_name: "core".to_string(),
                depends_on: Vec::new(),
                host_names: hosts.iter().map(|s| s.to_string()).collect(),
                noop: hosts.is_empty(),
                can_limit: true,
            },
        )
    }

    #[test]
    fn from_dag_rejects_empty_result() {
        let ops: crate::aggregator::Operations = HashMap::new();
        let dag = DagEngine::build(&ops).unwrap();
        let err = from_dag(&dag, None, None, Some(("nope_*", false)), false, false, false, None, 1)
            .unwrap_err();
        assert!(matches!(err, PlanError::NoOperationMatch));
    }

    #[test]
    fn from_dag_inserts_wait_sleep_after_restart() {
        let ops: crate::aggregator::Operations =
            [op("hdfs_namenode_start", &["h1", "h2"])].into_iter().collect();
        let dag = DagEngine::build(&ops).unwrap();
        let plan = from_dag(&dag, None, None, None, true, false, false, Some(30), 1).unwrap();
        // Rolling restart expands to one row per host, each followed by its
        // own wait_sleep.
        assert_eq!(plan.operations.len(), 4);
        assert_eq!(plan.operations[0].operation, "hdfs_namenode_restart");
        assert_eq!(plan.operations[0].host.as_deref(), Some("h1"));
        assert_eq!(plan.operations[1].operation, WAIT_SLEEP_OPERATION_NAME);
        assert_eq!(plan.operations[1].extra_vars, vec!["wait_sleep_seconds=30".to_string()]);
        assert_eq!(plan.operations[2].operation, "hdfs_namenode_restart");
        assert_eq!(plan.operations[2].host.as_deref(), Some("h2"));
        assert_eq!(plan.operations[3].operation, WAIT_SLEEP_OPERATION_NAME);
    }

    #[test]
    fn from_dag_rejects_restart_and_stop_together() {
        let ops: crate::aggregator::Operations =
            [op("hdfs_namenode_start", &["h1"])].into_iter().collect();
        let dag = DagEngine::build(&ops).unwrap();
        let err = from_dag(&dag, None, None, None, true, false, true, None, 1).unwrap_err();
        assert!(matches!(err, PlanError::RestartStopMutuallyExclusive));
    }

    #[test]
    fn from_operations_rejects_unknown_host() {
        let ops: crate::aggregator::Operations = [op("hdfs_namenode_install", &["h1"])].into_iter().collect();
        let collections = test_collections(ops);
        let err = from_operations(
            &collections,
            &["hdfs_namenode_install".to_string()],
            &["h9".to_string()],
            &[],
            None,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::MissingHostForOperation { .. }));
    }

    fn test_collections(ops: crate::aggregator::Operations) -> Collections {
        // Collections can only be built through from_collections in normal
        // use; for unit tests we build one from an empty collection list and
        // inject operations via from_operations_hosts_vars-style checks
        // instead would require exposing a constructor. Since Collections
        // has no public raw constructor, these planner tests exercise
        // DagEngine directly wherever possible, and this helper stands in
        // for a minimal single-collection aggregate built from temp files.
        build_single_op_collections(ops)
    }

    fn build_single_op_collections(ops: crate::aggregator::Operations) -> Collections {
        use tempfile::tempdir;
        let dir = tempdir().unwrap();
        let root = dir.path().join("core");
        std::fs::create_dir_all(root.join("tdp_lib_dag")).unwrap();
        std::fs::create_dir_all(root.join("tdp_vars_defaults")).unwrap();
        std::fs::create_dir_all(root.join("playbooks")).unwrap();
        let mut dag_yaml = String::new();
        for (name, op) in &ops {
            dag_yaml.push_str(&format!("- name: {name}\n  depends_on: []\n"));
            if !op.host_names.is_empty() {
                let hosts = op.host_names.join(", ");
                std::fs::write(
                    root.join("playbooks").join(format!("{name}.yml")),
                    format!("- hosts: [{hosts}]\n"),
                )
                .unwrap();
            }
        }
        std::fs::write(root.join("tdp_lib_dag").join("dag.yml"), dag_yaml).unwrap();
        let collection = crate::collection::Collection::from_path(&root).unwrap();
        Collections::from_collections(&[collection]).unwrap()
    }
}
