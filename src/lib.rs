//! TDP-lib: the control plane of a Hadoop-style cluster manager.
//!
//! Loads Ansible-shaped collections into a merged operation namespace (C1/C2),
//! builds a deterministic operation dependency graph (C4), tracks per-service
//! configuration variables (C3) and per-entity deployment status (C5), and
//! plans/runs deployments against an external playbook executor (C6/C7).

pub mod aggregator;
pub mod collection;
pub mod dag;
pub mod deployment;
pub mod entities;
pub mod error;
pub mod filters;
pub mod inventory;
pub mod status;
pub mod store;
pub mod types;
pub mod variables;

pub use error::{FixSuggestion, TdpError};
