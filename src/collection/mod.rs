//! Collections (C1): a declarative collection directory, read into
//! in-memory DAG nodes, playbooks, and schemas.

pub mod reader;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::FixSuggestion;

pub use reader::{DagNode, Playbook, Schema};

pub const DAG_DIRECTORY_NAME: &str = "tdp_lib_dag";
pub const DEFAULT_VARS_DIRECTORY_NAME: &str = "tdp_vars_defaults";
pub const PLAYBOOKS_DIRECTORY_NAME: &str = "playbooks";
pub const SCHEMA_VARS_DIRECTORY_NAME: &str = "tdp_vars_schema";

const MANDATORY_DIRECTORIES: &[&str] = &[
    DAG_DIRECTORY_NAME,
    DEFAULT_VARS_DIRECTORY_NAME,
    PLAYBOOKS_DIRECTORY_NAME,
];

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("collection path does not exist: {0}")]
    PathDoesNotExist(PathBuf),
    #[error("collection path is not a directory: {0}")]
    PathIsNotADirectory(PathBuf),
    #[error("collection {path} is missing mandatory directory '{directory}'")]
    MissingMandatoryDirectory { path: PathBuf, directory: &'static str },
    #[error("failed to parse DAG file {path}: {source}")]
    DagParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to parse playbook {path}: {source}")]
    PlaybookParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to read galaxy manifest {path}: {source}")]
    GalaxyParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FixSuggestion for CollectionError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            CollectionError::PathDoesNotExist(_) => {
                Some("check the collection path passed via TDP_COLLECTION_PATH")
            }
            CollectionError::MissingMandatoryDirectory { .. } => Some(
                "a collection must contain tdp_lib_dag/, tdp_vars_defaults/ and playbooks/",
            ),
            _ => None,
        }
    }
}

/// An enriched Ansible collection directory: DAG nodes, playbooks, schemas,
/// and an optional galaxy-derived version string.
///
/// Grounded on `CollectionReader` in `tdp/core/collections/collection_reader.py`.
#[derive(Debug, Clone)]
pub struct Collection {
    path: PathBuf,
    name: String,
    galaxy_version: Option<String>,
}

impl Collection {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, CollectionError> {
        let path = path.into();
        Self::check_structure(&path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let galaxy_version = read_galaxy_version(&path)?;
        debug!(collection = %name, galaxy_version = ?galaxy_version, "loaded collection");
        Ok(Collection {
            path,
            name,
            galaxy_version,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dag_directory(&self) -> PathBuf {
        self.path.join(DAG_DIRECTORY_NAME)
    }

    pub fn default_vars_directory(&self) -> PathBuf {
        self.path.join(DEFAULT_VARS_DIRECTORY_NAME)
    }

    pub fn playbooks_directory(&self) -> PathBuf {
        self.path.join(PLAYBOOKS_DIRECTORY_NAME)
    }

    pub fn schema_directory(&self) -> PathBuf {
        self.path.join(SCHEMA_VARS_DIRECTORY_NAME)
    }

    /// Version extracted from an optional `galaxy.yml` manifest at the
    /// collection root (spec §11.1; `tdp/core/variables/messages.py`'s
    /// `versions.galaxy` usage shows this feeding validation messages).
    pub fn galaxy_version(&self) -> Option<&str> {
        self.galaxy_version.as_deref()
    }

    pub fn read_dag_nodes(&self) -> Result<Vec<DagNode>, CollectionError> {
        reader::read_dag_nodes(&self.dag_directory())
    }

    pub fn read_playbooks(&self) -> Result<Vec<Playbook>, CollectionError> {
        reader::read_playbooks(&self.playbooks_directory(), &self.name)
    }

    pub fn read_schemas(&self) -> Vec<Schema> {
        match reader::read_schemas(&self.schema_directory()) {
            Ok(schemas) => schemas,
            Err(e) => {
                warn!(error = %e, "failed to list schema directory, treating as empty");
                Vec::new()
            }
        }
    }

    fn check_structure(path: &Path) -> Result<(), CollectionError> {
        if !path.exists() {
            return Err(CollectionError::PathDoesNotExist(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(CollectionError::PathIsNotADirectory(path.to_path_buf()));
        }
        for directory in MANDATORY_DIRECTORIES {
            let candidate = path.join(directory);
            if !candidate.is_dir() {
                return Err(CollectionError::MissingMandatoryDirectory {
                    path: path.to_path_buf(),
                    directory,
                });
            }
        }
        Ok(())
    }
}

fn read_galaxy_version(collection_path: &Path) -> Result<Option<String>, CollectionError> {
    let manifest = collection_path.join("galaxy.yml");
    if !manifest.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&manifest).map_err(|e| CollectionError::Io {
        path: manifest.clone(),
        source: e,
    })?;
    #[derive(serde::Deserialize)]
    struct GalaxyManifest {
        version: Option<String>,
    }
    let manifest_data: GalaxyManifest =
        serde_yaml::from_str(&content).map_err(|e| CollectionError::GalaxyParse {
            path: manifest,
            source: e,
        })?;
    Ok(manifest_data.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_minimal_collection(root: &Path) {
        std::fs::create_dir_all(root.join(DAG_DIRECTORY_NAME)).unwrap();
        std::fs::create_dir_all(root.join(DEFAULT_VARS_DIRECTORY_NAME)).unwrap();
        std::fs::create_dir_all(root.join(PLAYBOOKS_DIRECTORY_NAME)).unwrap();
    }

    #[test]
    fn rejects_missing_mandatory_directory() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(DAG_DIRECTORY_NAME)).unwrap();
        let err = Collection::from_path(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            CollectionError::MissingMandatoryDirectory { .. }
        ));
    }

    #[test]
    fn loads_minimal_collection() {
        let dir = tempdir().unwrap();
        make_minimal_collection(dir.path());
        let collection = Collection::from_path(dir.path()).unwrap();
        assert!(collection.galaxy_version().is_none());
        assert!(collection.read_dag_nodes().unwrap().is_empty());
    }

    #[test]
    fn reads_galaxy_version() {
        let dir = tempdir().unwrap();
        make_minimal_collection(dir.path());
        std::fs::write(dir.path().join("galaxy.yml"), "version: \"1.2.3\"\n").unwrap();
        let collection = Collection::from_path(dir.path()).unwrap();
        assert_eq!(collection.galaxy_version(), Some("1.2.3"));
    }
}
