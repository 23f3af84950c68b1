//! Cluster-wide aggregate view over every service's variables.
//!
//! Grounded on `tdp/core/variables/cluster_variables.py`'s
//! `ClusterVariables`: `initialize_cluster_variables` (seed `tdp_vars/<service>`
//! from each collection's default-vars directory plus operator override
//! folders) and `get_modified_components_names` (service-then-component
//! modification check).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{info, warn};

use super::store::{ServiceVariables, VariablesRepository};
use super::VariablesError;
use crate::aggregator::Collections as AggregatedCollections;
use crate::entities::ServiceComponentName;
use crate::types::ServiceName;

/// `service name -> ServiceVariables`, the full cluster variable tree.
#[derive(Debug, Default)]
pub struct ClusterVariables {
    services: HashMap<String, ServiceVariables>,
}

impl ClusterVariables {
    pub fn get(&self, service: &str) -> Option<&ServiceVariables> {
        self.services.get(service)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceVariables> {
        self.services.values()
    }

    /// Seeds `tdp_vars/<service>` directories from each collection's
    /// default-vars directory (in collection order) plus any override
    /// folders, committing the merged defaults for services that don't
    /// already have a version. Already-initialized services are left
    /// untouched. Grounded on `initialize_cluster_variables`.
    pub fn initialize(
        collections: &AggregatedCollections,
        tdp_vars: &Path,
        override_folders: &[&Path],
    ) -> Result<Self, VariablesError> {
        let mut services: HashMap<String, ServiceVariables> = HashMap::new();
        let mut initialized_here: HashSet<String> = HashSet::new();

        let mut sources: Vec<(String, std::path::PathBuf)> = Vec::new();
        for (collection_name, default_vars_dir) in collections.default_vars_dirs() {
            if let Ok(entries) = std::fs::read_dir(default_vars_dir) {
                for entry in entries.filter_map(|e| e.ok()) {
                    if entry.path().is_dir() {
                        sources.push((collection_name.clone(), entry.path()));
                    }
                }
            }
        }
        for (i, override_folder) in override_folders.iter().enumerate() {
            if let Ok(entries) = std::fs::read_dir(override_folder) {
                for entry in entries.filter_map(|e| e.ok()) {
                    if entry.path().is_dir() {
                        sources.push((format!("overrides_path_{i}"), entry.path()));
                    }
                }
            }
        }

        for (source_name, source_path) in sources {
            let service = source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let service_dir = tdp_vars.join(&service);
            std::fs::create_dir_all(&service_dir).map_err(|e| VariablesError::Io {
                path: service_dir.clone(),
                source: e,
            })?;

            let is_new = !services.contains_key(&service);
            if is_new {
                let repo = VariablesRepository::init(&service_dir)?;
                let name = ServiceName::new(&service).map_err(|_| {
                    VariablesError::SchemaValidation {
                        service: service.clone(),
                        detail: "service name exceeds the maximum length".to_string(),
                    }
                })?;
                services.insert(service.clone(), ServiceVariables::new(name, repo));
            }

            if services[&service].version().is_none() {
                initialized_here.insert(service.clone());
            }

            if initialized_here.contains(&service) {
                let message = format!("add variables from {source_name}");
                match services[&service].update_from_variables_folder(&message, &source_path) {
                    Ok(version) => info!(service = %service, %version, "seeded variables"),
                    Err(VariablesError::EmptyCommit(_)) => {
                        warn!(service = %service, path = %source_path.display(), "override caused no change, no commit made");
                    }
                    Err(e) => return Err(e),
                }
            } else {
                info!(service = %service, "already initialized, not reseeding");
            }
        }

        Ok(ClusterVariables { services })
    }

    /// Reload a previously-initialized `tdp_vars` directory without seeding
    /// anything. Grounded on `get_cluster_variables`.
    pub fn load(tdp_vars: &Path) -> Result<Self, VariablesError> {
        let mut services = HashMap::new();
        if !tdp_vars.is_dir() {
            return Ok(ClusterVariables { services });
        }
        for entry in std::fs::read_dir(tdp_vars)
            .map_err(|e| VariablesError::Io {
                path: tdp_vars.to_path_buf(),
                source: e,
            })?
            .filter_map(|e| e.ok())
        {
            if !entry.path().is_dir() {
                continue;
            }
            let service = entry.file_name().to_string_lossy().into_owned();
            let repo = VariablesRepository::init(entry.path())?;
            let name = ServiceName::new(&service).map_err(|_| VariablesError::SchemaValidation {
                service: service.clone(),
                detail: "service name exceeds the maximum length".to_string(),
            })?;
            services.insert(service, ServiceVariables::new(name, repo));
        }
        Ok(ClusterVariables { services })
    }

    /// Components (and bare services) modified since the version a deployed
    /// `(service, component?, version)` triple was recorded at. A component
    /// is reported as modified either directly, or because its owning
    /// service is. Grounded on `get_modified_components_names`.
    pub fn modified_entities(
        &self,
        deployed: &[(ServiceComponentName, String)],
    ) -> HashSet<ServiceComponentName> {
        let mut modified = HashSet::new();
        let mut modified_services = HashSet::new();

        for (name, version) in deployed {
            if name.component().is_some() {
                continue;
            }
            let Some(service) = self.services.get(name.service().as_str()) else {
                warn!(service = %name.service(), "deployed service has no variables repository");
                continue;
            };
            let filename = format!("{}.yml", name.service());
            if service.is_sc_modified_from_version(&filename, version) {
                modified.insert(name.clone());
                modified_services.insert(name.service().to_string());
            }
        }

        for (name, version) in deployed {
            let Some(component) = name.component() else {
                continue;
            };
            if modified_services.contains(name.service().as_str()) {
                continue;
            }
            let Some(service) = self.services.get(name.service().as_str()) else {
                continue;
            };
            let filename = format!("{component}.yml");
            if service.is_sc_modified_from_version(&filename, version) {
                modified.insert(name.clone());
            }
        }

        modified
    }
}
