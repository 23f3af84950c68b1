//! DAG engine (C4): builds the operation dependency graph, validates it, and
//! exposes deterministic retrieval/ordering algorithms.
//!
//! Grounded on the teacher's `flow_graph.rs` (`FlowGraph`: adjacency +
//! predecessor maps over `Arc<str>`, BFS `has_path`) for the graph shape, and
//! on `tdp/core/constants.py`'s `SERVICE_PRIORITY` table plus
//! `tdp/core/models/deployment_model.py`'s `_get_reconfigure_operation_hosts`
//! for the deterministic ordering and tie-break rules.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::warn;

use crate::aggregator::{Operation, Operations};
use crate::error::FixSuggestion;
use crate::filters::Filter;

/// `service -> priority` ordering used to break topological-sort ties.
/// Grounded verbatim on `tdp/core/constants.py::SERVICE_PRIORITY`.
pub fn service_priority(service: &str) -> u32 {
    match service {
        "exporter" => 1,
        "zookeeper" => 2,
        "hadoop" => 3,
        "ranger" => 4,
        "hdfs" => 5,
        "yarn" => 6,
        "hive" => 7,
        "hbase" => 8,
        "spark" => 9,
        "spark3" => 10,
        "knox" => 11,
        _ => DEFAULT_SERVICE_PRIORITY,
    }
}

pub const DEFAULT_SERVICE_PRIORITY: u32 = 99;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("operation '{op}' depends on unknown operation '{dep}'")]
    UnresolvedDependency { op: String, dep: String },
    #[error("dependency cycle detected involving operation '{0}'")]
    Cycle(String),
}

impl FixSuggestion for GraphError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            GraphError::UnresolvedDependency { .. } => {
                Some("check depends_on entries in the DAG files reference operations that exist")
            }
            GraphError::Cycle(_) => Some("break the dependency cycle in the DAG files"),
        }
    }
}

/// A built, validated operation dependency graph plus the operations it was
/// built from.
#[derive(Debug)]
pub struct DagEngine {
    operations: Operations,
    /// dep -> [operations depending on dep]
    successors: FxHashMap<String, Vec<String>>,
    /// op -> [deps]
    predecessors: FxHashMap<String, Vec<String>>,
}

impl DagEngine {
    pub fn build(operations: &Operations) -> Result<Self, GraphError> {
        let mut successors: FxHashMap<String, Vec<String>> = FxHashMap::default();
        let mut predecessors: FxHashMap<String, Vec<String>> = FxHashMap::default();

        for name in operations.keys() {
            successors.entry(name.clone()).or_default();
            predecessors.entry(name.clone()).or_default();
        }

        for (name, op) in operations {
            for dep in &op.depends_on {
                if !operations.contains_key(dep) {
                    return Err(GraphError::UnresolvedDependency {
                        op: name.clone(),
                        dep: dep.clone(),
                    });
                }
                successors.get_mut(dep).unwrap().push(name.clone());
                predecessors.get_mut(name).unwrap().push(dep.clone());
            }
        }

        let engine = DagEngine {
            operations: operations.clone(),
            successors,
            predecessors,
        };
        engine.check_acyclic()?;
        engine.warn_unreachable_aggregators();
        Ok(engine)
    }

    fn check_acyclic(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = self
            .operations
            .keys()
            .map(|n| (n.as_str(), Mark::Unvisited))
            .collect();

        for start in self.operations.keys() {
            if marks[start.as_str()] != Mark::Unvisited {
                continue;
            }
            let mut stack = vec![(start.as_str(), 0usize)];
            marks.insert(start.as_str(), Mark::InProgress);
            while let Some((node, idx)) = stack.pop() {
                let deps = &self.predecessors[node];
                if idx < deps.len() {
                    stack.push((node, idx + 1));
                    let dep = deps[idx].as_str();
                    match marks.get(dep).copied().unwrap_or(Mark::Unvisited) {
                        Mark::Unvisited => {
                            marks.insert(dep, Mark::InProgress);
                            stack.push((dep, 0));
                        }
                        Mark::InProgress => return Err(GraphError::Cycle(dep.to_string())),
                        Mark::Done => {}
                    }
                } else {
                    marks.insert(node, Mark::Done);
                }
            }
        }
        Ok(())
    }

    /// Diagnostic-only: warn when a non-noop operation has no path to its
    /// service-level `<service>_<action>` aggregator.
    fn warn_unreachable_aggregators(&self) {
        for (name, op) in &self.operations {
            if op.noop || op.name.component.is_none() {
                continue;
            }
            let aggregator = format!("{}_{}", op.name.service, op.name.action);
            if !self.operations.contains_key(&aggregator) {
                continue;
            }
            if !self.has_path(name, &aggregator) {
                warn!(
                    operation = %name,
                    aggregator = %aggregator,
                    "no path from operation to its service-level aggregator"
                );
            }
        }
    }

    fn has_path(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(from);
        visited.insert(from);
        while let Some(node) = queue.pop_front() {
            if let Some(successors) = self.successors.get(node) {
                for next in successors {
                    if next == to {
                        return true;
                    }
                    if visited.insert(next.as_str()) {
                        queue.push_back(next.as_str());
                    }
                }
            }
        }
        false
    }

    fn ancestors_inclusive(&self, roots: &[String]) -> HashSet<String> {
        let mut seen: HashSet<String> = roots.iter().cloned().collect();
        let mut queue: VecDeque<String> = roots.iter().cloned().collect();
        while let Some(node) = queue.pop_front() {
            if let Some(deps) = self.predecessors.get(&node) {
                for dep in deps {
                    if seen.insert(dep.clone()) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }
        seen
    }

    fn descendants_inclusive(&self, roots: &[String]) -> HashSet<String> {
        let mut seen: HashSet<String> = roots.iter().cloned().collect();
        let mut queue: VecDeque<String> = roots.iter().cloned().collect();
        while let Some(node) = queue.pop_front() {
            if let Some(succ) = self.successors.get(&node) {
                for next in succ {
                    if seen.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
            }
        }
        seen
    }

    /// All dag-operations, in deterministic topological order.
    pub fn get_all_operations(&self) -> Vec<&Operation> {
        self.sorted(self.operations.keys().cloned().collect())
    }

    /// Retrieve operations within the closure described by `sources`/`targets`,
    /// deterministically ordered, with `restart`/`stop` name rewriting applied.
    pub fn get_operations(
        &self,
        sources: Option<&[String]>,
        targets: Option<&[String]>,
        restart: bool,
        stop: bool,
    ) -> Vec<Operation> {
        let mut working: Option<HashSet<String>> = None;

        if let Some(sources) = sources {
            working = Some(self.descendants_inclusive(sources));
        }
        if let Some(targets) = targets {
            let ancestors = self.ancestors_inclusive(targets);
            working = Some(match working {
                Some(w) => w.intersection(&ancestors).cloned().collect(),
                None => ancestors,
            });
        }

        let names: Vec<String> = match working {
            Some(set) => set.into_iter().collect(),
            None => self.operations.keys().cloned().collect(),
        };

        self.sorted(names)
            .into_iter()
            .cloned()
            .map(|op| rewrite_start(op, restart, stop))
            .collect()
    }

    pub fn filter_operations_glob(&self, ops: &[Operation], pattern: &str) -> Vec<Operation> {
        let filter = Filter::glob(pattern);
        ops.iter().filter(|op| filter.matches(op.name.as_str())).cloned().collect()
    }

    pub fn filter_operations_regex(&self, ops: &[Operation], pattern: &str) -> Result<Vec<Operation>, regex::Error> {
        let filter = Filter::regex(pattern)?;
        Ok(ops.iter().filter(|op| filter.matches(op.name.as_str())).cloned().collect())
    }

    /// Ancestor sub-graph of `nodes`, for CLI visualization (not used by the
    /// planner/runner path).
    pub fn ancestor_subgraph(&self, nodes: &[String]) -> Vec<String> {
        let mut set = self.ancestors_inclusive(nodes);
        let mut result: Vec<String> = set.drain().collect();
        result.sort_by(|a, b| self.sort_key(a).cmp(&self.sort_key(b)));
        result
    }

    fn sort_key(&self, name: &str) -> (u32, String) {
        let service = self
            .operations
            .get(name)
            .map(|op| op.name.service.as_str())
            .unwrap_or("");
        (service_priority(service), name.to_string())
    }

    /// Kahn's algorithm restricted to `names`, breaking ties among
    /// simultaneously-ready nodes by `(service_priority, name)` so the result
    /// is both a valid topological order and deterministic across calls.
    /// Dependencies outside `names` (e.g. a `sources`-only descendant whose
    /// own predecessor wasn't pulled in) are ignored rather than enforced.
    fn sorted(&self, names: Vec<String>) -> Vec<&Operation> {
        let name_set: HashSet<&str> = names.iter().map(|s| s.as_str()).collect();
        let mut indegree: HashMap<String, usize> = HashMap::new();
        for name in &names {
            let count = self
                .predecessors
                .get(name)
                .map(|deps| deps.iter().filter(|d| name_set.contains(d.as_str())).count())
                .unwrap_or(0);
            indegree.insert(name.clone(), count);
        }

        let mut ready: BTreeSet<(u32, String)> = names
            .iter()
            .filter(|n| indegree[n.as_str()] == 0)
            .map(|n| self.sort_key(n))
            .collect();

        let mut order = Vec::with_capacity(names.len());
        while let Some(key) = ready.iter().next().cloned() {
            ready.remove(&key);
            let name = key.1;
            if let Some(succs) = self.successors.get(&name) {
                for succ in succs {
                    if !name_set.contains(succ.as_str()) {
                        continue;
                    }
                    if let Some(d) = indegree.get_mut(succ) {
                        *d -= 1;
                        if *d == 0 {
                            ready.insert(self.sort_key(succ));
                        }
                    }
                }
            }
            order.push(name);
        }

        order
            .into_iter()
            .filter_map(|name| self.operations.get(&name))
            .collect()
    }
}

fn rewrite_start(mut op: Operation, restart: bool, stop: bool) -> Operation {
    if !restart && !stop {
        return op;
    }
    if op.name.action.as_str() != "start" {
        return op;
    }
    let new_action = if restart { "restart" } else { "stop" };
    if let Ok(renamed) = op.name.with_action(new_action) {
        op.name = renamed;
    }
    op
}

/// `(operation_name, host)` pairs, sorted by `"{operation_name}_{host_name}"`
/// as `_get_reconfigure_operation_hosts` does, used by the reconfigure
/// planner (C6).
pub fn sort_operation_host_pairs(pairs: &mut [(String, Option<String>)]) {
    pairs.sort_by(|a, b| {
        let key_a = format!("{}_{}", a.0, a.1.as_deref().unwrap_or(""));
        let key_b = format!("{}_{}", b.0, b.1.as_deref().unwrap_or(""));
        key_a.cmp(&key_b)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::OperationName;

    fn op(name: &str, depends_on: &[&str]) -> (String, Operation) {
        (
            name.to_string(),
            Operation {
                name: OperationName::parse(name).unwrap(),
                collection_name: "core".to_string(),
                depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
                host_names: Vec::new(),
                noop: depends_on.is_empty(),
                can_limit: true,
            },
        )
    }

    #[test]
    fn rejects_unresolved_dependency() {
        let ops: Operations = [op("hdfs_init", &["hdfs_missing"])].into_iter().collect();
        let err = DagEngine::build(&ops).unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedDependency { .. }));
    }

    #[test]
    fn rejects_cycle() {
        let ops: Operations = [op("a_x", &["b_x"]), op("b_x", &["a_x"])].into_iter().collect();
        let err = DagEngine::build(&ops).unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
    }

    #[test]
    fn deterministic_order_uses_service_priority_then_name() {
        let ops: Operations = [op("yarn_install", &[]), op("hdfs_install", &[])]
            .into_iter()
            .collect();
        let engine = DagEngine::build(&ops).unwrap();
        let all = engine.get_all_operations();
        let names: Vec<&str> = all.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["hdfs_install", "yarn_install"]);
    }

    #[test]
    fn restart_rewrites_start_suffix() {
        let ops: Operations = [op("hdfs_namenode_start", &[])].into_iter().collect();
        let engine = DagEngine::build(&ops).unwrap();
        let result = engine.get_operations(None, None, true, false);
        assert_eq!(result[0].name.as_str(), "hdfs_namenode_restart");
    }

    #[test]
    fn targets_restrict_to_ancestor_closure() {
        let ops: Operations = [
            op("hdfs_install", &[]),
            op("hdfs_config", &["hdfs_install"]),
            op("hdfs_start", &["hdfs_config"]),
            op("hdfs_unrelated", &[]),
        ]
        .into_iter()
        .collect();
        let engine = DagEngine::build(&ops).unwrap();
        let result = engine.get_operations(None, Some(&["hdfs_start".to_string()]), false, false);
        let names: HashSet<&str> = result.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            ["hdfs_install", "hdfs_config", "hdfs_start"].into_iter().collect()
        );
    }
}
