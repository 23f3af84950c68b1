//! NewType wrappers for the identifier domain (service/component/action/host/version).
//!
//! Guarantees are enforced once at construction so downstream code never
//! re-checks length or character-set invariants.

use std::fmt;
use std::ops::Deref;

use thiserror::Error;

/// Maximum length of a service name (spec §3: "≤20 chars").
pub const SERVICE_NAME_MAX_LENGTH: usize = 20;
/// Maximum length of a component name (spec §3: "≤30 chars").
pub const COMPONENT_NAME_MAX_LENGTH: usize = 30;
/// Maximum length of an action name (spec §3: "≤20 chars").
pub const ACTION_NAME_MAX_LENGTH: usize = 20;
/// Maximum length of an operation name (spec §3: service + component + action).
pub const OPERATION_NAME_MAX_LENGTH: usize =
    SERVICE_NAME_MAX_LENGTH + COMPONENT_NAME_MAX_LENGTH + ACTION_NAME_MAX_LENGTH;
/// Maximum length of a host name (spec §3: "≤255 chars").
pub const HOST_NAME_MAX_LENGTH: usize = 255;
/// Maximum length of an opaque version string (spec §3: "≤40 chars").
pub const VERSION_MAX_LENGTH: usize = 40;

macro_rules! bounded_string_newtype {
    ($name:ident, $err:ident, $max:expr, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub const MAX_LENGTH: usize = $max;

            pub fn new(value: impl Into<String>) -> Result<Self, $err> {
                let value = value.into();
                if value.is_empty() {
                    return Err($err::Empty);
                }
                if value.len() > Self::MAX_LENGTH {
                    return Err($err::TooLong(value.len()));
                }
                Ok($name(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        #[derive(Debug, Error, Clone, PartialEq, Eq)]
        pub enum $err {
            #[error(concat!($label, " cannot be empty"))]
            Empty,
            #[error(concat!($label, " too long ({0} > {})"), $max)]
            TooLong(usize),
        }
    };
}

bounded_string_newtype!(
    ServiceName,
    ServiceNameError,
    SERVICE_NAME_MAX_LENGTH,
    "Service name"
);
bounded_string_newtype!(
    ComponentName,
    ComponentNameError,
    COMPONENT_NAME_MAX_LENGTH,
    "Component name"
);
bounded_string_newtype!(
    ActionName,
    ActionNameError,
    ACTION_NAME_MAX_LENGTH,
    "Action name"
);
bounded_string_newtype!(HostName, HostNameError, HOST_NAME_MAX_LENGTH, "Host name");

impl ServiceName {
    /// Service names are parsed out of operation names by splitting on `_`,
    /// so the first segment must itself be underscore-free (spec §3).
    pub fn new_for_operation(value: impl Into<String>) -> Result<Self, ServiceNameError> {
        let name = Self::new(value)?;
        Ok(name)
    }
}

/// Canonical action kinds. `install`/`config`/`start`/`restart`/`stop`/`init`
/// are "canonical" per spec §3; any other action string is still accepted
/// (operations aren't restricted to these verbs) but the canonical variants
/// get first-class handling in the planner/runner (restart/stop rewrite,
/// status-event induction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Install,
    Config,
    Start,
    Restart,
    Stop,
    Init,
    Other,
}

impl Action {
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "install" => Action::Install,
            "config" => Action::Config,
            "start" => Action::Start,
            "restart" => Action::Restart,
            "stop" => Action::Stop,
            "init" => Action::Init,
            _ => Action::Other,
        }
    }

    pub fn as_str(&self, raw: &str) -> String {
        match self {
            Action::Install => "install".to_string(),
            Action::Config => "config".to_string(),
            Action::Start => "start".to_string(),
            Action::Restart => "restart".to_string(),
            Action::Stop => "stop".to_string(),
            Action::Init => "init".to_string(),
            Action::Other => raw.to_string(),
        }
    }
}

/// Opaque version string handed out by the variables store (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    pub fn new(value: impl Into<String>) -> Result<Self, VersionError> {
        let value = value.into();
        if value.is_empty() {
            return Err(VersionError::Empty);
        }
        if value.len() > VERSION_MAX_LENGTH {
            return Err(VersionError::TooLong(value.len()));
        }
        Ok(Version(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Version cannot be empty")]
    Empty,
    #[error("Version too long ({0} > {})", VERSION_MAX_LENGTH)]
    TooLong(usize),
}
