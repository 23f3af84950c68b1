//! Entity names: the service/component/action/host vocabulary operations and
//! status events are built from.
//!
//! Two distinct parsers live here and must never be confused (spec REDESIGN
//! FLAGS): [`ServiceComponentName::from_name`] splits on the *first*
//! underscore (used when a hosted-entity name is already known to carry a
//! component), while [`OperationName::parse`] splits an operation name into
//! service/component/action by anchoring the action on the *last* underscore
//! and the service on the first, the way the Ansible-facing `LegacyOperation`
//! parser in the source project does it.

use std::fmt;

use thiserror::Error;

use crate::types::{
    Action, ActionName, ComponentName, ComponentNameError, ServiceName, ServiceNameError,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntityNameError {
    #[error(transparent)]
    Service(#[from] ServiceNameError),
    #[error(transparent)]
    Component(#[from] ComponentNameError),
    #[error("'{0}' cannot be split into service and component")]
    NotSplittable(String),
}

/// A hosted-entity name: either a bare service or a service+component pair.
///
/// Grounded on `tdp/core/entities/hostable_entity_name.py`'s
/// `parse_hostable_entity_name`: splits on underscore presence, not on
/// action suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServiceComponentName {
    Service(ServiceName),
    Component(ServiceName, ComponentName),
}

impl ServiceComponentName {
    pub fn service(&self) -> &ServiceName {
        match self {
            ServiceComponentName::Service(s) => s,
            ServiceComponentName::Component(s, _) => s,
        }
    }

    pub fn component(&self) -> Option<&ComponentName> {
        match self {
            ServiceComponentName::Service(_) => None,
            ServiceComponentName::Component(_, c) => Some(c),
        }
    }

    /// Splits on the *first* underscore only: `service_component_with_underscores`.
    pub fn from_name(name: &str) -> Result<Self, EntityNameError> {
        match name.split_once('_') {
            None => Ok(ServiceComponentName::Service(ServiceName::new(name)?)),
            Some((service, component)) => Ok(ServiceComponentName::Component(
                ServiceName::new(service)?,
                ComponentName::new(component)?,
            )),
        }
    }
}

impl fmt::Display for ServiceComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceComponentName::Service(s) => write!(f, "{s}"),
            ServiceComponentName::Component(s, c) => write!(f, "{s}_{c}"),
        }
    }
}

/// A fully parsed operation name: `<service>[_<component>]_<action>`.
///
/// Grounded on `tdp/core/operation.py`'s `RE_GET_SERVICE` / `RE_GET_ACTION` /
/// `RE_GET_COMPONENT`: service is the first `_`-delimited segment, action is
/// the last, and whatever remains in between (if anything) is the component.
/// This is deliberately NOT the same split as [`ServiceComponentName::from_name`]
/// (see module docs).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationName {
    pub service: ServiceName,
    pub component: Option<ComponentName>,
    pub action: ActionName,
    full: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperationNameError {
    #[error("operation name '{0}' has no underscore-delimited service segment")]
    NoService(String),
    #[error("operation name '{0}' has no underscore-delimited action segment")]
    NoAction(String),
    #[error(transparent)]
    Service(#[from] ServiceNameError),
    #[error(transparent)]
    Component(#[from] ComponentNameError),
    #[error("operation name exceeds {0} characters")]
    TooLong(usize),
}

impl OperationName {
    /// Maximum combined length of a full operation name (spec §3: "≤72 chars").
    pub const MAX_LENGTH: usize = 72;

    pub fn parse(name: &str) -> Result<Self, OperationNameError> {
        if name.len() > Self::MAX_LENGTH {
            return Err(OperationNameError::TooLong(name.len()));
        }

        let service_raw = name
            .split('_')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OperationNameError::NoService(name.to_string()))?;

        let action_raw = name
            .rsplit('_')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OperationNameError::NoAction(name.to_string()))?;

        if service_raw.len() + action_raw.len() + 1 > name.len() {
            return Err(OperationNameError::NoAction(name.to_string()));
        }

        let middle_start = service_raw.len() + 1;
        let middle_end = name.len() - action_raw.len() - 1;
        let component = if middle_end > middle_start {
            Some(ComponentName::new(&name[middle_start..middle_end])?)
        } else {
            None
        };

        Ok(OperationName {
            service: ServiceName::new(service_raw)?,
            component,
            action: ActionName::new(action_raw)?,
            full: name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    pub fn action_kind(&self) -> Action {
        Action::from_str_lossy(self.action.as_str())
    }

    /// `true` for a service-level operation (no component segment).
    pub fn is_service_operation(&self) -> bool {
        self.component.is_none()
    }

    pub fn service_component(&self) -> ServiceComponentName {
        match &self.component {
            Some(c) => ServiceComponentName::Component(self.service.clone(), c.clone()),
            None => ServiceComponentName::Service(self.service.clone()),
        }
    }

    /// Rewrite the action suffix, keeping service/component. Used by the
    /// aggregator's noop `_start` → `_restart`/`_stop` synthesis.
    pub fn with_action(&self, action: &str) -> Result<Self, OperationNameError> {
        let prefix = match &self.component {
            Some(c) => format!("{}_{}", self.service, c),
            None => self.service.to_string(),
        };
        Self::parse(&format!("{prefix}_{action}"))
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full)
    }
}

/// A service or service+component placed on a specific host (or cluster-wide
/// when `host` is `None`). Grounded on
/// `tdp/core/entities/hosted_entity.py`'s `HostedService`/`HostedServiceComponent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostedEntity {
    pub name: ServiceComponentName,
    pub host: Option<String>,
}

impl HostedEntity {
    pub fn new(name: ServiceComponentName, host: Option<String>) -> Self {
        HostedEntity { name, host }
    }
}

impl fmt::Display for HostedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(h) => write!(f, "{}@{}", self.name, h),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Point-in-time status attached to a [`HostedEntity`] (spec §3). Mirrors
/// `tdp/core/entities/hosted_entity_status.py`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostedEntityStatus {
    pub running_version: Option<String>,
    pub configured_version: Option<String>,
    pub to_config: bool,
    pub to_restart: bool,
    pub is_active: Option<bool>,
}

impl HostedEntityStatus {
    /// A stale-config component/service (spec §4.7: `is_sc_stale`).
    pub fn is_stale(&self) -> bool {
        self.to_config || self.to_restart
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_operation() {
        let op = OperationName::parse("hdfs_init").unwrap();
        assert_eq!(op.service.as_str(), "hdfs");
        assert!(op.component.is_none());
        assert_eq!(op.action.as_str(), "init");
    }

    #[test]
    fn parses_component_operation() {
        let op = OperationName::parse("hdfs_namenode_start").unwrap();
        assert_eq!(op.service.as_str(), "hdfs");
        assert_eq!(op.component.as_ref().unwrap().as_str(), "namenode");
        assert_eq!(op.action.as_str(), "start");
    }

    #[test]
    fn parses_component_with_underscores() {
        let op = OperationName::parse("hdfs_journal_node_start").unwrap();
        assert_eq!(op.service.as_str(), "hdfs");
        assert_eq!(op.component.as_ref().unwrap().as_str(), "journal_node");
        assert_eq!(op.action.as_str(), "start");
    }

    #[test]
    fn with_action_rewrites_suffix() {
        let op = OperationName::parse("hdfs_namenode_start").unwrap();
        let restart = op.with_action("restart").unwrap();
        assert_eq!(restart.as_str(), "hdfs_namenode_restart");
    }

    #[test]
    fn service_component_name_splits_on_first_underscore_only() {
        let scn = ServiceComponentName::from_name("hdfs_journal_node").unwrap();
        assert_eq!(scn.service().as_str(), "hdfs");
        assert_eq!(scn.component().unwrap().as_str(), "journal_node");
    }

    #[test]
    fn hosted_entity_status_stale_when_either_flag_set() {
        let mut status = HostedEntityStatus::default();
        assert!(!status.is_stale());
        status.to_config = true;
        assert!(status.is_stale());
    }
}
