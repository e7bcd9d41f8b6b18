//! Workflow and task errors

use serde::{Deserialize, Serialize};
use thiserror::Error;
use truemesh_types::WorkflowId;

use crate::state::WorkflowState;

/// Terminal reason a step did not succeed. Carried inside the step result,
/// never returned from the engine API.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    #[error("Task timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("Task failed: {reason}")]
    Failure { reason: String },

    #[error("No agent registered for capability: {task_type}")]
    UnknownCapability { task_type: String },

    #[error("Dependency failed: {dependency}")]
    DependencyFailed { dependency: String },

    #[error("Ledger rejected the step result: {reason}")]
    LedgerRejected { reason: String },

    #[error("Task cancelled: {reason}")]
    Cancelled { reason: String },
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow not found: {workflow_id}")]
    NotFound { workflow_id: WorkflowId },

    #[error("Invalid pipeline: {reason}")]
    InvalidPipeline { reason: String },

    #[error("Unknown pipeline: {name}")]
    UnknownPipeline { name: String },

    #[error("Illegal state transition: {from:?} -> {to:?}")]
    IllegalTransition { from: WorkflowState, to: WorkflowState },

    #[error("Workflow store error: {message}")]
    Store { message: String },

    #[error("Ledger error: {0}")]
    Ledger(#[from] truemesh_ledger::LedgerError),
}

impl WorkflowError {
    pub fn invalid_pipeline(reason: impl Into<String>) -> Self {
        WorkflowError::InvalidPipeline {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
