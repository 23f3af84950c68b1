//! Deployment planner (C6) and runner (C7): turning operation selections
//! into persisted plans, and persisted plans into executed, status-producing
//! deployments.

pub mod model;
pub mod planner;
pub mod runner;

pub use model::{DeploymentModel, DeploymentState, DeploymentType, FilterType, OperationModel, OperationState};
pub use planner::{PlanError, WAIT_SLEEP_OPERATION_NAME};
pub use runner::{DeploymentRunner, Executor, ExecutorResult, RunnerError};
