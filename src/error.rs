//! Unified error handling with fix suggestions.
//!
//! Mirrors the layering used across the rest of the crate: each subsystem
//! (collection reader, aggregator, variables store, DAG engine, status
//! engine, planner, runner) owns its own error enum. `TdpError` wraps them
//! for callers that want a single error type at the CLI boundary.

use thiserror::Error;

use crate::aggregator::AggregatorError;
use crate::collection::CollectionError;
use crate::dag::GraphError;
use crate::deployment::planner::PlanError;
use crate::deployment::runner::RunnerError;
use crate::status::StatusError;
use crate::store::StoreError;
use crate::variables::VariablesError;

/// Trait for errors that can provide actionable fix suggestions.
pub trait FixSuggestion {
    /// Get a fix suggestion for this error, if available.
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Top-level error type, unifying every subsystem's errors.
#[derive(Error, Debug)]
pub enum TdpError {
    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    Variables(#[from] VariablesError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl TdpError {
    pub fn other(msg: impl Into<String>) -> Self {
        TdpError::Other(msg.into())
    }
}

impl FixSuggestion for TdpError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            TdpError::Collection(e) => e.fix_suggestion(),
            TdpError::Aggregator(e) => e.fix_suggestion(),
            TdpError::Variables(e) => e.fix_suggestion(),
            TdpError::Graph(e) => e.fix_suggestion(),
            TdpError::Status(e) => e.fix_suggestion(),
            TdpError::Plan(e) => e.fix_suggestion(),
            TdpError::Runner(e) => e.fix_suggestion(),
            TdpError::Store(e) => e.fix_suggestion(),
            _ => None,
        }
    }
}
