//! Collections aggregator (C2): merges an ordered list of collections into a
//! single namespace of operations.
//!
//! Grounded on `tdp/core/collections/collections.py`'s `Collections` class:
//! `_init_playbooks` (last writer wins), `_init_operations` (DAG/playbook
//! merge with noop `_start` expansion), `_init_entities`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::collection::{Collection, CollectionError, Playbook, Schema};
use crate::entities::{OperationName, OperationNameError, ServiceComponentName};
use crate::error::FixSuggestion;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error(transparent)]
    Collection(#[from] CollectionError),
    #[error("invalid operation name '{name}': {source}")]
    InvalidOperationName {
        name: String,
        #[source]
        source: OperationNameError,
    },
}

impl FixSuggestion for AggregatorError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            AggregatorError::Collection(e) => e.fix_suggestion(),
            AggregatorError::InvalidOperationName { .. } => {
                Some("operation names must be <service>[_<component>]_<action>, ≤72 chars")
            }
        }
    }
}

/// A fully-resolved operation: name, owning collection, dependency set, the
/// hosts it may run on, and whether it's a synthetic aggregator (`noop`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: OperationName,
    pub collection_name: String,
    pub depends_on: Vec<String>,
    pub host_names: Vec<String>,
    pub noop: bool,
    pub can_limit: bool,
}

impl Operation {
    fn dedup_depends_on(&mut self) {
        let mut seen = HashSet::new();
        self.depends_on.retain(|d| seen.insert(d.clone()));
    }
}

/// `name -> Operation` namespace, split into dag-operations and
/// other-operations by [`Collections`].
pub type Operations = HashMap<String, Operation>;

/// Merged view across an ordered sequence of collections.
#[derive(Debug)]
pub struct Collections {
    playbooks: HashMap<String, Playbook>,
    dag_operations: Operations,
    other_operations: Operations,
    default_vars_dirs: HashMap<String, PathBuf>,
    schemas: Vec<Schema>,
    entities: HashMap<String, HashSet<ServiceComponentName>>,
}

impl Collections {
    pub fn from_collections(collections: &[Collection]) -> Result<Self, AggregatorError> {
        let playbooks = Self::init_playbooks(collections)?;
        let (dag_operations, other_operations) =
            Self::init_operations(collections, &playbooks)?;
        let default_vars_dirs = collections
            .iter()
            .map(|c| (c.name().to_string(), c.default_vars_directory()))
            .collect();
        let schemas = collections.iter().flat_map(|c| c.read_schemas()).collect();
        let entities = Self::init_entities(&dag_operations, &other_operations)?;

        Ok(Collections {
            playbooks,
            dag_operations,
            other_operations,
            default_vars_dirs,
            schemas,
            entities,
        })
    }

    pub fn dag_operations(&self) -> &Operations {
        &self.dag_operations
    }

    pub fn other_operations(&self) -> &Operations {
        &self.other_operations
    }

    /// All operations, dag ∪ other (dag wins on name clash, though by
    /// construction the two namespaces are disjoint).
    pub fn operations(&self) -> Operations {
        let mut merged = self.other_operations.clone();
        merged.extend(self.dag_operations.clone());
        merged
    }

    pub fn playbooks(&self) -> &HashMap<String, Playbook> {
        &self.playbooks
    }

    pub fn default_vars_dirs(&self) -> &HashMap<String, PathBuf> {
        &self.default_vars_dirs
    }

    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    pub fn entities(&self) -> &HashMap<String, HashSet<ServiceComponentName>> {
        &self.entities
    }

    fn init_playbooks(
        collections: &[Collection],
    ) -> Result<HashMap<String, Playbook>, AggregatorError> {
        debug!("initializing playbooks");
        let mut playbooks: HashMap<String, Playbook> = HashMap::new();
        for collection in collections {
            for playbook in collection.read_playbooks()? {
                let name = playbook
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if let Some(previous) = playbooks.get(&name) {
                    debug!(
                        operation = %name,
                        from = %previous.collection_name,
                        to = %collection.name(),
                        "playbook overridden"
                    );
                }
                playbooks.insert(name, playbook);
            }
        }
        Ok(playbooks)
    }

    fn init_operations(
        collections: &[Collection],
        playbooks: &HashMap<String, Playbook>,
    ) -> Result<(Operations, Operations), AggregatorError> {
        let mut dag_operations: Operations = HashMap::new();
        let mut other_operations: Operations = HashMap::new();

        for collection in collections {
            for dag_node in collection.read_dag_nodes()? {
                let parsed = parse_name(&dag_node.name)?;

                if let Some(playbook) = playbooks.get(&dag_node.name) {
                    let mut depends_on = dag_node.depends_on.clone();
                    if let Some(existing) = dag_operations.get(&dag_node.name) {
                        depends_on.extend(existing.depends_on.iter().cloned());
                    }
                    let mut op = Operation {
                        name: parsed,
                        collection_name: collection.name().to_string(),
                        depends_on,
                        host_names: playbook.hosts.clone(),
                        noop: false,
                        can_limit: playbook.can_limit.unwrap_or(true),
                    };
                    op.dedup_depends_on();
                    dag_operations.insert(dag_node.name.clone(), op);
                    continue;
                }

                if let Some(existing) = dag_operations.get_mut(&dag_node.name) {
                    debug!(
                        operation = %dag_node.name,
                        from = %existing.collection_name,
                        extended_by = %collection.name(),
                        "dag node extended"
                    );
                    existing.depends_on.extend(dag_node.depends_on.iter().cloned());
                    existing.dedup_depends_on();
                    continue;
                }

                // Noop: not (yet) backed by any playbook.
                dag_operations.insert(
                    dag_node.name.clone(),
                    Operation {
                        name: parsed,
                        collection_name: collection.name().to_string(),
                        depends_on: dag_node.depends_on.clone(),
                        host_names: Vec::new(),
                        noop: true,
                        can_limit: true,
                    },
                );
            }
        }

        // Synthesize sibling `_restart`/`_stop` operations for every noop
        // `_start` aggregator, once all collections have been merged into
        // `dag_operations` above. Deferred to the end (rather than done at
        // first-sight inside the loop) so a later collection extending the
        // same `_start` noop's `depends_on` is reflected in its siblings too,
        // instead of leaving them pinned to a stale first-collection snapshot.
        let start_noops: Vec<(String, Vec<String>)> = dag_operations
            .iter()
            .filter(|(name, op)| op.noop && name.ends_with("_start"))
            .map(|(name, op)| (name.clone(), op.depends_on.clone()))
            .collect();
        for (start_name_full, depends_on) in start_noops {
            let start_name = start_name_full.strip_suffix("_start").unwrap();
            debug!(operation = %start_name_full, "noop start, synthesizing restart/stop");
            for (suffix, synthetic_collection) in
                [("_restart", "replace_restart_noop"), ("_stop", "replace_stop_noop")]
            {
                let synthetic_name = format!("{start_name}{suffix}");
                let synthetic_parsed = parse_name(&synthetic_name)?;
                other_operations.insert(
                    synthetic_name,
                    Operation {
                        name: synthetic_parsed,
                        collection_name: synthetic_collection.to_string(),
                        depends_on: depends_on.clone(),
                        host_names: Vec::new(),
                        noop: true,
                        can_limit: true,
                    },
                );
            }
        }

        // Playbook-only operations: anything with a playbook that never
        // appeared in a DAG file. Attribute ownership to the playbook's own
        // collection rather than whichever collection happened to be last
        // in the outer loop.
        for (name, playbook) in playbooks {
            if dag_operations.contains_key(name) {
                continue;
            }
            if let Some(existing) = other_operations.get(name) {
                debug!(
                    operation = %name,
                    from = %existing.collection_name,
                    to = %playbook.collection_name,
                    "playbook-only operation overridden"
                );
            }
            let parsed = parse_name(name)?;
            other_operations.insert(
                name.clone(),
                Operation {
                    name: parsed,
                    collection_name: playbook.collection_name.clone(),
                    depends_on: Vec::new(),
                    host_names: playbook.hosts.clone(),
                    noop: false,
                    can_limit: playbook.can_limit.unwrap_or(true),
                },
            );
        }

        Ok((dag_operations, other_operations))
    }

    fn init_entities(
        dag_operations: &Operations,
        other_operations: &Operations,
    ) -> Result<HashMap<String, HashSet<ServiceComponentName>>, AggregatorError> {
        let mut entities: HashMap<String, HashSet<ServiceComponentName>> = HashMap::new();
        for operation in dag_operations.values().chain(other_operations.values()) {
            let service = entities
                .entry(operation.name.service.to_string())
                .or_default();
            if operation.name.component.is_some() {
                service.insert(operation.name.service_component());
            }
        }
        Ok(entities)
    }
}

fn parse_name(name: &str) -> Result<OperationName, AggregatorError> {
    OperationName::parse(name).map_err(|source| AggregatorError::InvalidOperationName {
        name: name.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_collection(root: &std::path::Path, dag_yaml: &str, playbooks: &[(&str, &str)]) {
        let dag_dir = root.join("tdp_lib_dag");
        let vars_dir = root.join("tdp_vars_defaults");
        let pb_dir = root.join("playbooks");
        std::fs::create_dir_all(&dag_dir).unwrap();
        std::fs::create_dir_all(&vars_dir).unwrap();
        std::fs::create_dir_all(&pb_dir).unwrap();
        std::fs::write(dag_dir.join("dag.yml"), dag_yaml).unwrap();
        for (name, content) in playbooks {
            std::fs::write(pb_dir.join(format!("{name}.yml")), content).unwrap();
        }
    }

    #[test]
    fn merges_depends_on_across_collections_and_expands_noop_start() {
        let base = tempdir().unwrap();
        let c1 = base.path().join("core");
        write_collection(
            &c1,
            "- name: hdfs_namenode_start\n  depends_on: [hdfs_namenode_install]\n",
            &[("hdfs_namenode_install", "- hosts: h1\n")],
        );
        let c2 = base.path().join("extra");
        write_collection(
            &c2,
            "- name: hdfs_namenode_start\n  depends_on: [hdfs_namenode_config]\n",
            &[],
        );

        let collections = vec![
            Collection::from_path(&c1).unwrap(),
            Collection::from_path(&c2).unwrap(),
        ];
        let merged = Collections::from_collections(&collections).unwrap();

        let start = merged.dag_operations().get("hdfs_namenode_start").unwrap();
        assert!(start.noop);
        let mut deps = start.depends_on.clone();
        deps.sort();
        assert_eq!(
            deps,
            vec![
                "hdfs_namenode_config".to_string(),
                "hdfs_namenode_install".to_string()
            ]
        );

        // The synthetic restart/stop siblings must carry the fully-merged
        // depends_on set, not just the first collection that mentioned the
        // noop start.
        for sibling in ["hdfs_namenode_restart", "hdfs_namenode_stop"] {
            let op = merged.other_operations().get(sibling).unwrap();
            let mut deps = op.depends_on.clone();
            deps.sort();
            assert_eq!(
                deps,
                vec![
                    "hdfs_namenode_config".to_string(),
                    "hdfs_namenode_install".to_string()
                ]
            );
        }
    }

    #[test]
    fn playbook_backs_a_noop_when_defined_later() {
        let base = tempdir().unwrap();
        let c1 = base.path().join("core");
        write_collection(
            &c1,
            "- name: hdfs_zkfc_start\n  depends_on: []\n",
            &[],
        );
        let c2 = base.path().join("extra");
        write_collection(&c2, "[]\n", &[("hdfs_zkfc_start", "- hosts: h1\n")]);

        let collections = vec![
            Collection::from_path(&c1).unwrap(),
            Collection::from_path(&c2).unwrap(),
        ];
        let merged = Collections::from_collections(&collections).unwrap();
        let op = merged.dag_operations().get("hdfs_zkfc_start").unwrap();
        assert!(!op.noop);
        assert_eq!(op.host_names, vec!["h1".to_string()]);
    }
}
