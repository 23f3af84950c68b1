//! Directory-level parsing of a single collection: DAG node files, playbooks,
//! and variable schemas.
//!
//! Grounded on `tdp/core/collections/collection_reader.py`'s
//! `CollectionReader.read_dag_nodes` / `read_playbooks` / `read_schemas`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::CollectionError;
use crate::inventory::InventoryReader;

/// One record of a `tdp_lib_dag/*.yml` file: `{name, depends_on: []}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DagNode {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A playbook definition: the set of hosts it may run against and whether
/// its steps can be limited to a subset of those hosts.
#[derive(Debug, Clone)]
pub struct Playbook {
    pub path: PathBuf,
    pub collection_name: String,
    pub hosts: Vec<String>,
    pub can_limit: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct PlaybookPlay {
    hosts: PlaybookHosts,
    #[serde(default)]
    vars: Option<PlaybookVars>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlaybookHosts {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct PlaybookVars {
    tdp_lib: Option<PlaybookTdpLibMeta>,
}

#[derive(Debug, Deserialize)]
struct PlaybookTdpLibMeta {
    can_limit: Option<bool>,
}

/// A per-service JSON schema loaded from `tdp_vars_schema/*.json`.
#[derive(Debug, Clone)]
pub struct Schema {
    pub service_name: String,
    pub path: PathBuf,
    pub schema: serde_json::Value,
}

pub fn read_dag_nodes(dag_directory: &Path) -> Result<Vec<DagNode>, CollectionError> {
    let mut nodes = Vec::new();
    if !dag_directory.is_dir() {
        return Ok(nodes);
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dag_directory)
        .map_err(|e| CollectionError::Io {
            path: dag_directory.to_path_buf(),
            source: e,
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "yml").unwrap_or(false))
        .collect();
    entries.sort();

    for path in entries {
        let content = std::fs::read_to_string(&path).map_err(|e| CollectionError::Io {
            path: path.clone(),
            source: e,
        })?;
        let file_nodes: Vec<DagNode> =
            serde_yaml::from_str(&content).map_err(|e| CollectionError::DagParse {
                path: path.clone(),
                source: e,
            })?;
        nodes.extend(file_nodes);
    }
    Ok(nodes)
}

pub fn read_playbooks(
    playbooks_directory: &Path,
    collection_name: &str,
) -> Result<Vec<Playbook>, CollectionError> {
    let inventory = InventoryReader::default();
    let mut playbooks = Vec::new();
    if !playbooks_directory.is_dir() {
        return Ok(playbooks);
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(playbooks_directory)
        .map_err(|e| CollectionError::Io {
            path: playbooks_directory.to_path_buf(),
            source: e,
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "yml").unwrap_or(false))
        .collect();
    entries.sort();

    for path in entries {
        let content = std::fs::read_to_string(&path).map_err(|e| CollectionError::Io {
            path: path.clone(),
            source: e,
        })?;
        let plays: Vec<PlaybookPlay> =
            serde_yaml::from_str(&content).map_err(|e| CollectionError::PlaybookParse {
                path: path.clone(),
                source: e,
            })?;

        let mut hosts = Vec::new();
        let mut can_limit = None;
        for play in &plays {
            let pattern_hosts = match &play.hosts {
                PlaybookHosts::One(pattern) => inventory.resolve(pattern),
                PlaybookHosts::Many(patterns) => patterns
                    .iter()
                    .flat_map(|p| inventory.resolve(p))
                    .collect(),
            };
            for host in pattern_hosts {
                if !hosts.contains(&host) {
                    hosts.push(host);
                }
            }
            if let Some(flag) = play.vars.as_ref().and_then(|v| v.tdp_lib.as_ref()).and_then(|t| t.can_limit) {
                // `false` on any play means the whole playbook cannot be limited.
                can_limit = Some(can_limit.unwrap_or(true) && flag);
            }
        }

        playbooks.push(Playbook {
            path,
            collection_name: collection_name.to_string(),
            hosts,
            can_limit,
        });
    }
    Ok(playbooks)
}

pub fn read_schemas(schema_directory: &Path) -> Result<Vec<Schema>, CollectionError> {
    let mut schemas = Vec::new();
    if !schema_directory.is_dir() {
        return Ok(schemas);
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(schema_directory)
        .map_err(|e| CollectionError::Io {
            path: schema_directory.to_path_buf(),
            source: e,
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect();
    entries.sort();

    for path in entries {
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable schema");
                continue;
            }
        };
        let schema: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid schema JSON, ignoring");
                continue;
            }
        };
        let service_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        schemas.push(Schema {
            service_name,
            path,
            schema,
        });
    }
    Ok(schemas)
}
