//! Persistence seam for workflow snapshots

use async_trait::async_trait;
use dashmap::DashMap;
use truemesh_types::WorkflowId;

use crate::error::Result;
use crate::state::WorkflowRecord;

/// Durable workflow state. The engine saves a snapshot on every transition
/// and serves finished workflows from here.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn save_workflow_state(&self, id: &WorkflowId, record: &WorkflowRecord) -> Result<()>;

    async fn load_workflow_state(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>>;
}

#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    records: DashMap<WorkflowId, WorkflowRecord>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn save_workflow_state(&self, id: &WorkflowId, record: &WorkflowRecord) -> Result<()> {
        self.records.insert(*id, record.clone());
        Ok(())
    }

    async fn load_workflow_state(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }
}
