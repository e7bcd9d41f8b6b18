//! TrueMesh Types - Canonical identifiers shared by the provenance core
//!
//! This crate has zero dependencies on other truemesh crates. It defines:
//!
//! - Generated identity types (WorkflowId, TaskId, TransactionId)
//! - The caller-supplied SubjectId (a provider identifier)
//! - TaskType, the key under which capabilities are registered

pub mod identity;
pub mod task;

pub use identity::*;
pub use task::*;
