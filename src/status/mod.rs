//! Cluster status engine (C5): an append-only event log plus a field-wise
//! reducer that derives the current status of every hosted entity.
//!
//! Grounded on the teacher's `event_log.rs` (`EventLog`: `Arc<RwLock<Vec<_>>>`
//! of append-only, monotonically-id'd events) for the log shape, and on
//! `tdp/core/cluster_status.py` (`ClusterStatus.update_hosted_entity`) plus
//! `tdp/core/models/sch_status_log_model.py` (`SCHStatusLogModel` columns)
//! for event semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::entities::{HostedEntity, HostedEntityStatus};
use crate::error::FixSuggestion;
use crate::variables::cluster::ClusterVariables;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("unknown entity '{0}' referenced in a status event")]
    UnknownEntity(String),
}

impl FixSuggestion for StatusError {
    fn fix_suggestion(&self) -> Option<&str> {
        None
    }
}

/// Source of a status event. `original_source` only models DEPLOYMENT /
/// FORCED / STALE / MANUAL; `Decommission` is named by the wider spec and
/// implemented here as a fifth source (documented as an intentional
/// addition in the grounding ledger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSource {
    Deployment,
    Forced,
    Stale,
    Manual,
    Decommission,
}

/// One append-only row in the status log. Mirrors `SCHStatusLogModel`'s
/// columns; `is_active` is carried even though the original model snapshot
/// lacks it, because the wider status/entity model names it explicitly.
#[derive(Debug, Clone)]
pub struct SCHStatusLogEvent {
    pub id: u64,
    pub event_time: u64,
    pub service: String,
    pub component: Option<String>,
    pub host: Option<String>,
    pub running_version: Option<String>,
    pub configured_version: Option<String>,
    pub to_config: Option<bool>,
    pub to_restart: Option<bool>,
    pub is_active: Option<bool>,
    pub source: StatusSource,
    pub deployment_id: Option<u64>,
    pub message: Option<String>,
}

impl SCHStatusLogEvent {
    fn entity_key(&self) -> (String, Option<String>, Option<String>) {
        (self.service.clone(), self.component.clone(), self.host.clone())
    }
}

/// Builder for a status event, since most fields are optional/null by
/// default (a null field in the reducer leaves the running value alone).
#[derive(Debug, Clone, Default)]
pub struct StatusEventBuilder {
    pub service: String,
    pub component: Option<String>,
    pub host: Option<String>,
    pub running_version: Option<String>,
    pub configured_version: Option<String>,
    pub to_config: Option<bool>,
    pub to_restart: Option<bool>,
    pub is_active: Option<bool>,
    pub deployment_id: Option<u64>,
    pub message: Option<String>,
}

/// The append-only event log. Grounded on `EventLog` in `event_log.rs`:
/// `Arc<RwLock<Vec<_>>>` behind monotonically-assigned ids, with an
/// `emit`-style append that returns the assigned id.
#[derive(Debug, Clone)]
pub struct StatusLog {
    events: Arc<RwLock<Vec<SCHStatusLogEvent>>>,
    next_id: Arc<AtomicU64>,
    clock: Arc<AtomicU64>,
}

impl Default for StatusLog {
    fn default() -> Self {
        StatusLog {
            events: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            clock: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// The owning service-level entity of a component-level `HostedEntity`.
/// Modification detection is host-independent (§4.3), so `to_config` stale
/// events for a service are always recorded with `host=None` regardless of
/// which hosts its components run on; the parent lookup key must match that
/// rather than the component's own host. `None` for entities that are
/// already service-level.
fn parent_entity(entity: &HostedEntity) -> Option<HostedEntity> {
    match &entity.name {
        crate::entities::ServiceComponentName::Component(service, _) => Some(HostedEntity::new(
            crate::entities::ServiceComponentName::Service(service.clone()),
            None,
        )),
        crate::entities::ServiceComponentName::Service(_) => None,
    }
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event at the given source, stamping the next monotonic id
    /// and a logical timestamp. Returns the appended event's id.
    pub fn emit(&self, builder: StatusEventBuilder, source: StatusSource) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event_time = self.clock.fetch_add(1, Ordering::SeqCst);
        self.events.write().push(SCHStatusLogEvent {
            id,
            event_time,
            service: builder.service,
            component: builder.component,
            host: builder.host,
            running_version: builder.running_version,
            configured_version: builder.configured_version,
            to_config: builder.to_config,
            to_restart: builder.to_restart,
            is_active: builder.is_active,
            source,
            deployment_id: builder.deployment_id,
            message: builder.message,
        });
        id
    }

    pub fn events(&self) -> Vec<SCHStatusLogEvent> {
        self.events.read().clone()
    }

    /// Reduce the log into the current status of every hosted entity.
    /// Grounded on spec §4.5's reduction semantics: walk events ordered by
    /// `(event_time, id)`, per `(service, component, host)` group; every
    /// non-null field overwrites the running tuple, null fields leave it
    /// untouched.
    pub fn current_status(&self) -> HashMap<HostedEntity, HostedEntityStatus> {
        let mut events = self.events();
        events.sort_by_key(|e| (e.event_time, e.id));

        let mut by_key: HashMap<(String, Option<String>, Option<String>), HostedEntityStatus> =
            HashMap::new();

        for event in &events {
            let key = event.entity_key();
            let status = by_key.entry(key).or_default();
            if let Some(v) = &event.running_version {
                status.running_version = Some(v.clone());
            }
            if let Some(v) = &event.configured_version {
                status.configured_version = Some(v.clone());
            }
            if let Some(v) = event.to_config {
                status.to_config = v;
            }
            if let Some(v) = event.to_restart {
                status.to_restart = v;
            }
            if let Some(v) = event.is_active {
                status.is_active = Some(v);
            }
        }

        by_key
            .into_iter()
            .map(|((service, component, host), status)| {
                let name = match component {
                    Some(c) => crate::entities::ServiceComponentName::from_name(&format!(
                        "{service}_{c}"
                    ))
                    .unwrap_or_else(|_| {
                        crate::entities::ServiceComponentName::from_name(&service).unwrap()
                    }),
                    None => {
                        crate::entities::ServiceComponentName::from_name(&service).unwrap()
                    }
                };
                (HostedEntity::new(name, host), status)
            })
            .collect()
    }

    /// Filtered view over the reduced status table.
    pub fn find_statuses(
        &self,
        service: Option<&str>,
        component: Option<&str>,
        hosts: Option<&[String]>,
        stale: Option<bool>,
        active: Option<bool>,
    ) -> Vec<(HostedEntity, HostedEntityStatus)> {
        self.current_status()
            .into_iter()
            .filter(|(entity, status)| {
                if let Some(s) = service {
                    if entity.name.service().as_str() != s {
                        return false;
                    }
                }
                if let Some(c) = component {
                    if entity.name.component().map(|c2| c2.as_str()) != Some(c) {
                        return false;
                    }
                }
                if let Some(hosts) = hosts {
                    if !entity
                        .host
                        .as_ref()
                        .map(|h| hosts.contains(h))
                        .unwrap_or(false)
                    {
                        return false;
                    }
                }
                if let Some(stale) = stale {
                    if status.is_stale() != stale {
                        return false;
                    }
                }
                if let Some(active) = active {
                    if status.is_active != Some(active) {
                        return false;
                    }
                }
                true
            })
            .collect()
    }

    /// The update applied by a successful deployment operation. Grounded on
    /// `ClusterStatus.update_hosted_entity`: `config` sets
    /// `configured_version` (and clears `to_config` when `can_update_stale`),
    /// `restart` sets `running_version` (and clears `to_restart`), `start`
    /// copies `configured_version` into `running_version` only if one
    /// exists.
    pub fn record_operation_success(
        &self,
        service: &str,
        component: Option<&str>,
        host: Option<&str>,
        action: &str,
        version: Option<&str>,
        can_update_stale: bool,
        deployment_id: u64,
    ) {
        let mut builder = StatusEventBuilder {
            service: service.to_string(),
            component: component.map(str::to_string),
            host: host.map(str::to_string),
            deployment_id: Some(deployment_id),
            ..Default::default()
        };

        match action {
            "config" => {
                builder.configured_version = version.map(str::to_string);
                if can_update_stale {
                    builder.to_config = Some(false);
                }
            }
            "restart" => {
                builder.running_version = version.map(str::to_string);
                if can_update_stale {
                    builder.to_restart = Some(false);
                }
            }
            "start" => {
                let current = self
                    .current_status()
                    .into_iter()
                    .find(|(entity, _)| {
                        entity.name.service().as_str() == service
                            && entity.name.component().map(|c| c.as_str()) == component
                            && entity.host.as_deref() == host
                    })
                    .map(|(_, s)| s);
                let Some(configured) = current.and_then(|s| s.configured_version) else {
                    return;
                };
                builder.running_version = Some(configured);
            }
            _ => return,
        }

        self.emit(builder, StatusSource::Deployment);
    }

    /// Stale-detection pass (spec §4.5). Appends `STALE`-sourced events for
    /// every modified entity (`to_config=true`) and for every entity whose
    /// configured/running versions diverge or whose parent just went stale
    /// (`to_restart=true`). Idempotent: re-running with unchanged variables
    /// emits nothing new, since each pass only emits for entities that
    /// aren't already stale.
    pub fn generate_stale_sch_logs(
        &self,
        cluster_variables: &ClusterVariables,
        deployed: &[(crate::entities::ServiceComponentName, String)],
    ) -> Vec<u64> {
        let mut emitted = Vec::new();
        let current = self.current_status();
        let modified = cluster_variables.modified_entities(deployed);

        for name in &modified {
            let already_stale = current
                .iter()
                .any(|(entity, status)| entity.name == *name && status.to_config);
            if already_stale {
                continue;
            }
            let id = self.emit(
                StatusEventBuilder {
                    service: name.service().to_string(),
                    component: name.component().map(|c| c.as_str().to_string()),
                    to_config: Some(true),
                    ..Default::default()
                },
                StatusSource::Stale,
            );
            emitted.push(id);
        }

        // Re-read after the to_config pass so an entity that just went
        // stale above is visible to the to_restart pass below, instead of
        // requiring a second call to pick it up.
        let current = self.current_status();
        for (entity, status) in &current {
            let diverged = status.configured_version.is_some()
                && status.configured_version != status.running_version;
            let parent_went_stale = parent_entity(entity)
                .and_then(|parent| current.get(&parent))
                .map(|parent_status| parent_status.to_config || parent_status.to_restart)
                .unwrap_or(false);
            if (diverged || status.to_config || parent_went_stale) && !status.to_restart {
                let id = self.emit(
                    StatusEventBuilder {
                        service: entity.name.service().to_string(),
                        component: entity.name.component().map(|c| c.as_str().to_string()),
                        host: entity.host.clone(),
                        to_restart: Some(true),
                        ..Default::default()
                    },
                    StatusSource::Stale,
                );
                emitted.push(id);
            }
        }

        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduction_ignores_null_fields() {
        let log = StatusLog::new();
        log.emit(
            StatusEventBuilder {
                service: "hdfs".to_string(),
                component: Some("namenode".to_string()),
                configured_version: Some("v1".to_string()),
                ..Default::default()
            },
            StatusSource::Deployment,
        );
        log.emit(
            StatusEventBuilder {
                service: "hdfs".to_string(),
                component: Some("namenode".to_string()),
                to_restart: Some(true),
                ..Default::default()
            },
            StatusSource::Stale,
        );
        let status = log.current_status();
        let (_, s) = status
            .iter()
            .find(|(e, _)| e.name.component().is_some())
            .unwrap();
        assert_eq!(s.configured_version.as_deref(), Some("v1"));
        assert!(s.to_restart);
    }

    #[test]
    fn start_only_sets_running_when_configured_exists() {
        let log = StatusLog::new();
        log.record_operation_success("hdfs", Some("namenode"), None, "start", None, false, 1);
        assert!(log.current_status().is_empty());

        log.record_operation_success(
            "hdfs",
            Some("namenode"),
            None,
            "config",
            Some("v1"),
            false,
            1,
        );
        log.record_operation_success("hdfs", Some("namenode"), None, "start", None, false, 1);
        let (_, status) = log.current_status().into_iter().next().unwrap();
        assert_eq!(status.running_version.as_deref(), Some("v1"));
    }

    #[test]
    fn service_going_to_config_cascades_to_restart_on_its_components() {
        let log = StatusLog::new();
        log.record_operation_success(
            "hdfs",
            Some("namenode"),
            Some("h1"),
            "config",
            Some("v1"),
            false,
            1,
        );
        log.record_operation_success(
            "hdfs",
            Some("namenode"),
            Some("h1"),
            "restart",
            Some("v1"),
            false,
            1,
        );
        // A service-wide variable edit marks the service (not the
        // component) to_config=true; modification detection is
        // host-independent so this carries no host.
        log.emit(
            StatusEventBuilder {
                service: "hdfs".to_string(),
                to_config: Some(true),
                ..Default::default()
            },
            StatusSource::Stale,
        );

        let cluster_variables = crate::variables::ClusterVariables::default();
        log.generate_stale_sch_logs(&cluster_variables, &[]);

        let status = log.current_status();
        let (_, component_status) = status
            .iter()
            .find(|(e, _)| e.name.component().is_some())
            .unwrap();
        assert!(component_status.to_restart);
    }
}
