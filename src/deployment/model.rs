//! Deployment/operation state machines and enums (§3, §4.7).
//!
//! Grounded on `tdp/core/models/enums.py` (`DeploymentStateEnum`,
//! `OperationStateEnum`, `DeploymentTypeEnum`, `FilterTypeEnum`) and
//! `tdp/core/models/deployment_model.py` (`DeploymentModel`, `OperationModel`
//! row shape). `SCHStatusLogSourceEnum` lives in [`crate::status`] rather than
//! here since it's only ever attached to status events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Grounded on `DeploymentStateEnum`. String values match the original
/// column values verbatim for anyone inspecting the persisted store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentState {
    Planned,
    Running,
    Success,
    Failure,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Planned => "Planned",
            DeploymentState::Running => "Running",
            DeploymentState::Success => "Success",
            DeploymentState::Failure => "Failure",
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Grounded on `OperationStateEnum`. `Pending` is named by the original enum
/// but never assigned in this runner's state machine (every operation starts
/// `Planned`, not `Pending`); kept for column-shape fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    Planned,
    Running,
    Pending,
    Success,
    Failure,
    Held,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Planned => "Planned",
            OperationState::Running => "Running",
            OperationState::Pending => "Pending",
            OperationState::Success => "Success",
            OperationState::Failure => "Failure",
            OperationState::Held => "Held",
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Grounded on `DeploymentTypeEnum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentType {
    Dag,
    Operations,
    Resume,
    Reconfigure,
    Custom,
}

impl DeploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Dag => "Dag",
            DeploymentType::Operations => "Operations",
            DeploymentType::Resume => "Resume",
            DeploymentType::Reconfigure => "Reconfigure",
            DeploymentType::Custom => "Custom",
        }
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Grounded on `FilterTypeEnum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    Regex,
    Glob,
}

/// One row of the `operation` table (§6). `operation_order` is 1-based and
/// strictly increasing within a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationModel {
    pub operation_order: u32,
    pub operation: String,
    pub host: Option<String>,
    pub extra_vars: Vec<String>,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub state: OperationState,
    pub logs: Vec<u8>,
}

impl OperationModel {
    pub fn planned(operation_order: u32, operation: String, host: Option<String>, extra_vars: Vec<String>) -> Self {
        OperationModel {
            operation_order,
            operation,
            host,
            extra_vars,
            start_time: None,
            end_time: None,
            state: OperationState::Planned,
            logs: Vec::new(),
        }
    }

    pub fn is_noop_name(&self) -> bool {
        self.operation == super::planner::WAIT_SLEEP_OPERATION_NAME
    }
}

/// One row of the `deployment` table (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentModel {
    pub id: u64,
    pub deployment_type: DeploymentType,
    pub state: DeploymentState,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub operations: Vec<OperationModel>,
}

impl DeploymentModel {
    pub fn planned(id: u64, deployment_type: DeploymentType, operations: Vec<OperationModel>) -> Self {
        DeploymentModel {
            id,
            deployment_type,
            state: DeploymentState::Planned,
            start_time: None,
            end_time: None,
            operations,
        }
    }
}
