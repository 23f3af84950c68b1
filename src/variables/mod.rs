//! Configuration variables store (C3): versioned per-service variable
//! trees, merged from collection defaults and operator overrides.

pub mod cluster;
pub mod store;

use thiserror::Error;

use crate::error::FixSuggestion;

pub use cluster::ClusterVariables;
pub use store::{ServiceVariables, VariablesRepository};

#[derive(Debug, Error)]
pub enum VariablesError {
    #[error("commit produced no changes for service '{0}'")]
    EmptyCommit(String),
    #[error("service '{0}' has no committed version yet")]
    NoVersionYet(String),
    #[error("variables for service '{service}' failed schema validation: {detail}")]
    SchemaValidation { service: String, detail: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse variables file {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl FixSuggestion for VariablesError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            VariablesError::EmptyCommit(_) => {
                Some("nothing changed; this is a warning-level condition, not a bug")
            }
            VariablesError::SchemaValidation { .. } => {
                Some("check the service's tdp_vars_schema/*.json against the merged variables")
            }
            _ => None,
        }
    }
}
