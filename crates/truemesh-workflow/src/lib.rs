//! TrueMesh Workflow - Provider verification pipelines
//!
//! A workflow is one run of a [`Pipeline`] for one subject. The pipeline is
//! plain data (steps plus dependency edges) and the [`WorkflowEngine`]
//! interprets it:
//!
//! - steps whose dependencies have all settled are dispatched concurrently
//! - every attempt is bounded by a deadline and retried with exponential backoff
//! - a failed required step cancels its not-yet-started dependents
//! - a failed optional step only downgrades the outcome to
//!   completed-with-warnings; its dependents run without its result
//! - ledger-worthy successes are recorded before any dependent is dispatched
//!
//! Recorded ledger transactions are never retracted, whatever happens later
//! in the workflow.

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod state;
pub mod store;

pub use engine::{EngineConfig, WorkflowEngine};
pub use error::{Result, TaskError, WorkflowError};
pub use pipeline::{Pipeline, Step};
pub use policy::RetryPolicy;
pub use state::{
    StepRecord, StepStatus, TaskOutcome, TaskResult, WorkflowRecord, WorkflowState, WorkflowStatus,
};
pub use store::{MemoryWorkflowStore, WorkflowStore};
