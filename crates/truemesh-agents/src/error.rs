//! Registry and agent errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the capability registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No agent registered for capability: {task_type}")]
    UnknownCapability { task_type: String },

    #[error("Capability already registered: {task_type}")]
    DuplicateCapability { task_type: String },
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Failure reported by an agent for one attempt.
///
/// `retryable` tells the engine whether another attempt may succeed. A
/// malformed provider record will fail every time; a flaky upstream registry
/// might not.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{reason}")]
pub struct AgentFailure {
    pub reason: String,
    pub retryable: bool,
}

impl AgentFailure {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: false,
        }
    }
}
