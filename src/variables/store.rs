//! Per-service versioned variable file store.
//!
//! The original project backs each service's variable directory with a git
//! repository (`tdp/core/repository/repository.py`'s `Repository` ABC:
//! `init`, `validate(message)`, `current_version()`, `is_file_modified`).
//! Nothing in this crate's dependency stack provides git plumbing, so
//! [`VariablesRepository`] reimplements the same *interface* as a lightweight
//! in-memory commit log with content snapshots, the way the teacher's
//! `event_log.rs` keeps an append-only `Vec<Event>` behind a
//! `parking_lot::RwLock` with monotonic ids. Each "commit" snapshots the
//! full contents of every tracked variable file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::VariablesError;
use crate::types::{ServiceName, Version};

/// A single committed snapshot of a service's variable directory.
#[derive(Debug, Clone)]
struct Commit {
    id: u64,
    #[allow(dead_code)]
    message: String,
    /// filename (e.g. `namenode.yml`) -> raw file content at this commit.
    snapshot: BTreeMap<String, String>,
}

/// Append-only, versioned store for one service's variable directory.
#[derive(Debug, Clone)]
pub struct VariablesRepository {
    root: PathBuf,
    commits: Arc<RwLock<Vec<Commit>>>,
    next_id: Arc<AtomicU64>,
}

impl VariablesRepository {
    pub fn init(root: impl Into<PathBuf>) -> Result<Self, VariablesError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| VariablesError::Io {
            path: root.clone(),
            source: e,
        })?;
        Ok(VariablesRepository {
            root,
            commits: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn current_version(&self) -> Option<Version> {
        self.commits
            .read()
            .last()
            .and_then(|c| Version::new(format!("v{}", c.id)).ok())
    }

    /// Whether the working directory matches the last commit's snapshot for
    /// every tracked file.
    pub fn is_clean(&self) -> Result<bool, VariablesError> {
        let commits = self.commits.read();
        let Some(last) = commits.last() else {
            return Ok(true);
        };
        for (filename, content) in &last.snapshot {
            let on_disk = self.read_raw(filename)?;
            if on_disk.as_deref() != Some(content.as_str()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether `filename` differs between the commit tagged `since_version`
    /// and the current HEAD commit. Grounded on
    /// `Repository.is_file_modified(commit, path)`.
    pub fn is_file_modified(&self, since_version: &str, filename: &str) -> bool {
        let commits = self.commits.read();
        let Some(id) = parse_version_id(since_version) else {
            return true;
        };
        let Some(since) = commits.iter().find(|c| c.id == id) else {
            return true;
        };
        let Some(head) = commits.last() else {
            return true;
        };
        since.snapshot.get(filename) != head.snapshot.get(filename)
    }

    fn read_raw(&self, filename: &str) -> Result<Option<String>, VariablesError> {
        let path = self.root.join(filename);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| VariablesError::Io { path, source: e })
    }

    /// Read and parse a variable file.
    pub fn read_variables(&self, filename: &str) -> Result<Option<serde_yaml::Value>, VariablesError> {
        match self.read_raw(filename)? {
            None => Ok(None),
            Some(content) => {
                let path = self.root.join(filename);
                serde_yaml::from_str(&content)
                    .map(Some)
                    .map_err(|e| VariablesError::Parse { path, source: e })
            }
        }
    }

    pub fn write_variables(
        &self,
        filename: &str,
        value: &serde_yaml::Value,
    ) -> Result<(), VariablesError> {
        let path = self.root.join(filename);
        let content = serde_yaml::to_string(value).map_err(|e| VariablesError::Parse {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&path, content).map_err(|e| VariablesError::Io { path, source: e })
    }

    /// Scoped acquisition (spec contract method 4, grounded on
    /// `Repository.validate(message)`'s context-manager in
    /// `tdp/core/repository/repository.py`, used by `tdp vars edit` as
    /// `with repo.validate(message): repo.add_for_validation([path])`).
    ///
    /// Snapshots the current on-disk content of `filenames` before running
    /// `f`. If `f` returns `Ok`, stages exactly `filenames` and commits one
    /// new version with `message` — the same path `commit` takes. If `f`
    /// returns `Err`, every file in `filenames` is restored to its
    /// pre-call content (mirroring `Repository.restore_file`, invoked by
    /// `tdp vars edit` when the operator aborts) and the error is
    /// propagated instead of committing, so a failed edit never leaves a
    /// partially-written file on disk.
    pub fn open_files<E>(
        &self,
        service_name: &str,
        filenames: &[String],
        message: &str,
        f: impl FnOnce(&VariablesRepository) -> Result<(), E>,
    ) -> Result<Version, VariablesError>
    where
        E: Into<VariablesError>,
    {
        let before: Vec<(String, Option<String>)> = filenames
            .iter()
            .map(|filename| Ok((filename.clone(), self.read_raw(filename)?)))
            .collect::<Result<_, VariablesError>>()?;

        if let Err(e) = f(self) {
            for (filename, content) in &before {
                let path = self.root.join(filename);
                match content {
                    Some(original) => {
                        let _ = std::fs::write(&path, original);
                    }
                    None => {
                        let _ = std::fs::remove_file(&path);
                    }
                }
            }
            return Err(e.into());
        }

        self.commit(service_name, message, filenames)
    }

    /// Snapshot the current content of `filenames` (defaulting to every
    /// previously tracked file) as a new commit, unless nothing changed.
    pub fn commit(
        &self,
        service_name: &str,
        message: &str,
        filenames: &[String],
    ) -> Result<Version, VariablesError> {
        let mut commits = self.commits.write();
        let mut snapshot = commits.last().map(|c| c.snapshot.clone()).unwrap_or_default();

        for filename in filenames {
            match self.read_raw(filename)? {
                Some(content) => {
                    snapshot.insert(filename.clone(), content);
                }
                None => {
                    snapshot.remove(filename);
                }
            }
        }

        if commits.last().map(|c| &c.snapshot) == Some(&snapshot) {
            return Err(VariablesError::EmptyCommit(service_name.to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        commits.push(Commit {
            id,
            message: message.to_string(),
            snapshot,
        });
        info!(service = service_name, version = id, "committed variables");
        Version::new(format!("v{id}")).map_err(|_| VariablesError::EmptyCommit(service_name.to_string()))
    }
}

fn parse_version_id(version: &str) -> Option<u64> {
    version.strip_prefix('v').and_then(|n| n.parse().ok())
}

/// Variables for a single service (spec §4.3). Wraps a [`VariablesRepository`]
/// scoped to the service's `tdp_vars/<service>` directory.
///
/// Grounded on `tdp/core/variables/service_variables.py::ServiceVariables`.
#[derive(Debug, Clone)]
pub struct ServiceVariables {
    name: ServiceName,
    repository: VariablesRepository,
}

impl ServiceVariables {
    pub fn new(name: ServiceName, repository: VariablesRepository) -> Self {
        ServiceVariables { name, repository }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn repository(&self) -> &VariablesRepository {
        &self.repository
    }

    pub fn version(&self) -> Option<Version> {
        self.repository.current_version()
    }

    pub fn clean(&self) -> Result<bool, VariablesError> {
        self.repository.is_clean()
    }

    pub fn get_variables(&self, component_name: &str) -> Result<Option<serde_yaml::Value>, VariablesError> {
        self.repository
            .read_variables(&format!("{component_name}.yml"))
    }

    /// Merges every `*.yml` file under `overrides_dir` into the matching
    /// service variable file via [`deep_merge`], then commits. Grounded on
    /// `ServiceVariables.update_from_variables_folder`.
    pub fn update_from_variables_folder(
        &self,
        message: &str,
        overrides_dir: &Path,
    ) -> Result<Version, VariablesError> {
        let mut overrides: Vec<(String, PathBuf)> = Vec::new();
        if overrides_dir.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(overrides_dir)
                .map_err(|e| VariablesError::Io {
                    path: overrides_dir.to_path_buf(),
                    source: e,
                })?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|ext| ext == "yml").unwrap_or(false))
                .collect();
            entries.sort();

            for override_path in entries {
                let filename = override_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                overrides.push((filename, override_path));
            }
        }
        let touched: Vec<String> = overrides.iter().map(|(filename, _)| filename.clone()).collect();

        self.repository
            .open_files(self.name.as_str(), &touched, message, |repository| {
                for (filename, override_path) in &overrides {
                    let override_content = std::fs::read_to_string(override_path).map_err(|e| {
                        VariablesError::Io {
                            path: override_path.clone(),
                            source: e,
                        }
                    })?;
                    let override_value: serde_yaml::Value = serde_yaml::from_str(&override_content)
                        .map_err(|e| VariablesError::Parse {
                            path: override_path.clone(),
                            source: e,
                        })?;
                    let mut current = repository
                        .read_variables(filename)?
                        .unwrap_or(serde_yaml::Value::Mapping(Default::default()));
                    deep_merge(&mut current, &override_value);
                    repository.write_variables(filename, &current)?;
                }
                Ok::<(), VariablesError>(())
            })
    }

    /// A component is modified if either its own file or its owning
    /// service's file has changed since `version`. Grounded on
    /// `ServiceVariables.is_sc_modified_from_version`.
    pub fn is_sc_modified_from_version(&self, component_filename: &str, version: &str) -> bool {
        self.repository.is_file_modified(version, component_filename)
            || self
                .repository
                .is_file_modified(version, &format!("{}.yml", self.name.as_str()))
    }
}

/// Recursively merges `override_value` into `base`, mapping-key by
/// mapping-key, with scalars and sequences replaced wholesale. Grounded on
/// the implied `Variables.merge` deep-merge behavior named in spec §4.3
/// (service variable files compose additively, not by full replacement).
pub fn deep_merge(base: &mut serde_yaml::Value, override_value: &serde_yaml::Value) {
    match (base, override_value) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, override_value) => {
            *base = override_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn deep_merge_overrides_leaf_keeps_siblings() {
        let mut base: serde_yaml::Value = serde_yaml::from_str("a:\n  x: 1\n  y: 2\n").unwrap();
        let over: serde_yaml::Value = serde_yaml::from_str("a:\n  y: 20\n  z: 3\n").unwrap();
        deep_merge(&mut base, &over);
        let expected: serde_yaml::Value =
            serde_yaml::from_str("a:\n  x: 1\n  y: 20\n  z: 3\n").unwrap();
        assert_eq!(base, expected);
    }

    #[test]
    fn commit_is_noop_when_nothing_changed() {
        let dir = tempdir().unwrap();
        let repo = VariablesRepository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("namenode.yml"), "a: 1\n").unwrap();
        let v1 = repo.commit("hdfs", "first", &["namenode.yml".to_string()]).unwrap();
        assert_eq!(v1.as_str(), "v1");
        let err = repo
            .commit("hdfs", "noop", &["namenode.yml".to_string()])
            .unwrap_err();
        assert!(matches!(err, VariablesError::EmptyCommit(_)));
    }

    #[test]
    fn open_files_commits_on_success() {
        let dir = tempdir().unwrap();
        let repo = VariablesRepository::init(dir.path()).unwrap();
        let filenames = vec!["namenode.yml".to_string()];
        let version = repo
            .open_files("hdfs", &filenames, "set a", |repository| {
                repository.write_variables(
                    "namenode.yml",
                    &serde_yaml::from_str("a: 1\n").unwrap(),
                )
            })
            .unwrap();
        assert_eq!(version.as_str(), "v1");
        assert_eq!(
            repo.read_variables("namenode.yml").unwrap(),
            Some(serde_yaml::from_str("a: 1\n").unwrap())
        );
    }

    #[test]
    fn open_files_reverts_file_on_error() {
        let dir = tempdir().unwrap();
        let repo = VariablesRepository::init(dir.path()).unwrap();
        let filenames = vec!["namenode.yml".to_string()];
        repo.open_files("hdfs", &filenames, "set a", |repository| {
            repository.write_variables("namenode.yml", &serde_yaml::from_str("a: 1\n").unwrap())
        })
        .unwrap();

        let result: Result<Version, VariablesError> =
            repo.open_files("hdfs", &filenames, "set b", |repository| {
                repository.write_variables(
                    "namenode.yml",
                    &serde_yaml::from_str("a: 2\n").unwrap(),
                )?;
                Err(VariablesError::EmptyCommit("hdfs".to_string()))
            });
        assert!(result.is_err());
        assert_eq!(
            repo.read_variables("namenode.yml").unwrap(),
            Some(serde_yaml::from_str("a: 1\n").unwrap())
        );
    }

    #[test]
    fn is_file_modified_detects_changes_since_version() {
        let dir = tempdir().unwrap();
        let repo = VariablesRepository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("namenode.yml"), "a: 1\n").unwrap();
        let v1 = repo.commit("hdfs", "first", &["namenode.yml".to_string()]).unwrap();
        std::fs::write(dir.path().join("namenode.yml"), "a: 2\n").unwrap();
        repo.commit("hdfs", "second", &["namenode.yml".to_string()]).unwrap();
        assert!(repo.is_file_modified(v1.as_str(), "namenode.yml"));
        assert!(!repo.is_file_modified(v1.as_str(), "unrelated.yml"));
    }
}
