//! Persisted data-access layer: the deployment/operation tables (spec §6's
//! logical shape). Backed by an in-memory, monotonic-id append list, the same
//! `Arc<RwLock<_>>` + `parking_lot` shape used throughout this crate
//! (`status::StatusLog`, `variables::store::VariablesRepository`), mirroring
//! the teacher's `event_log.rs`. A JSON snapshot can be written to disk so a
//! CLI invocation can pick up where the previous one left off.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::deployment::{DeploymentModel, DeploymentState};
use crate::error::FixSuggestion;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a deployment is already RUNNING; only one may run at a time")]
    AlreadyRunning,
    #[error("no deployment with id {0}")]
    NotFound(u64),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse deployment store snapshot at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FixSuggestion for StoreError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            StoreError::AlreadyRunning => {
                Some("wait for the running deployment to finish, or use danger-fix-running")
            }
            _ => None,
        }
    }
}

/// Append-only, invariant-enforcing deployment store. Enforces "at most one
/// PLANNED, at most one RUNNING" (spec §5) at the store boundary: planning
/// replaces any existing `PLANNED` row in place, and starting a run refuses
/// if a `RUNNING` row already exists.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    deployments: Arc<RwLock<Vec<DeploymentModel>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for DeploymentStore {
    fn default() -> Self {
        DeploymentStore {
            deployments: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl DeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next deployment id, reusing the id of an existing
    /// `PLANNED` row if one exists (replace-in-place per spec §4.6).
    pub fn next_plan_id(&self) -> u64 {
        let deployments = self.deployments.read();
        if let Some(existing) = deployments.iter().find(|d| d.state == DeploymentState::Planned) {
            return existing.id;
        }
        self.next_id.load(Ordering::SeqCst)
    }

    /// Persist a freshly-planned deployment, replacing any existing
    /// `PLANNED` row that shares its id.
    pub fn save_plan(&self, plan: DeploymentModel) {
        let mut deployments = self.deployments.write();
        if let Some(slot) = deployments.iter_mut().find(|d| d.id == plan.id) {
            *slot = plan;
        } else {
            self.next_id.fetch_add(1, Ordering::SeqCst);
            deployments.push(plan);
        }
    }

    /// Begin running a `PLANNED` deployment. Fails if any deployment is
    /// already `RUNNING`.
    pub fn begin_run(&self, id: u64) -> Result<(), StoreError> {
        let deployments = self.deployments.read();
        if deployments.iter().any(|d| d.state == DeploymentState::Running) {
            return Err(StoreError::AlreadyRunning);
        }
        if !deployments.iter().any(|d| d.id == id) {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub fn get(&self, id: u64) -> Option<DeploymentModel> {
        self.deployments.read().iter().find(|d| d.id == id).cloned()
    }

    pub fn update(&self, deployment: DeploymentModel) -> Result<(), StoreError> {
        let mut deployments = self.deployments.write();
        let slot = deployments
            .iter_mut()
            .find(|d| d.id == deployment.id)
            .ok_or(StoreError::NotFound(deployment.id))?;
        *slot = deployment;
        Ok(())
    }

    pub fn last_planned(&self) -> Option<DeploymentModel> {
        self.deployments
            .read()
            .iter()
            .find(|d| d.state == DeploymentState::Planned)
            .cloned()
    }

    pub fn running(&self) -> Option<DeploymentModel> {
        self.deployments
            .read()
            .iter()
            .find(|d| d.state == DeploymentState::Running)
            .cloned()
    }

    pub fn last_failed(&self) -> Option<DeploymentModel> {
        self.deployments
            .read()
            .iter()
            .rev()
            .find(|d| d.state == DeploymentState::Failure)
            .cloned()
    }

    pub fn all(&self) -> Vec<DeploymentModel> {
        self.deployments.read().clone()
    }

    /// Write a JSON snapshot of every deployment to `path`, so the next CLI
    /// invocation (a fresh process, a fresh empty store) can pick up where
    /// this one left off. Since this crate carries no database crate, a
    /// flat file stands in for the original's SQL-backed persistence.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let deployments = self.deployments.read();
        let json = serde_json::to_vec_pretty(&*deployments).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, json).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load a previously-saved snapshot, or an empty store if `path` doesn't
    /// exist yet (first run).
    pub fn load_snapshot(path: &Path) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Ok(Self::new());
        }
        let content = std::fs::read(path).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let deployments: Vec<DeploymentModel> =
            serde_json::from_slice(&content).map_err(|e| StoreError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        let next_id = deployments.iter().map(|d| d.id).max().unwrap_or(0) + 1;
        Ok(DeploymentStore {
            deployments: Arc::new(RwLock::new(deployments)),
            next_id: Arc::new(AtomicU64::new(next_id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{DeploymentType, OperationModel};

    fn plan(id: u64) -> DeploymentModel {
        DeploymentModel::planned(
            id,
            DeploymentType::Dag,
            vec![OperationModel::planned(1, "hdfs_install".to_string(), None, vec![])],
        )
    }

    #[test]
    fn save_plan_replaces_existing_planned_row() {
        let store = DeploymentStore::new();
        store.save_plan(plan(1));
        assert_eq!(store.all().len(), 1);
        store.save_plan(plan(1));
        assert_eq!(store.all().len(), 1);
    }

    #[test]
    fn begin_run_rejects_when_already_running() {
        let store = DeploymentStore::new();
        let mut running = plan(1);
        running.state = DeploymentState::Running;
        store.save_plan(running);
        store.save_plan(plan(2));
        let err = store.begin_run(2).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyRunning));
    }
}
