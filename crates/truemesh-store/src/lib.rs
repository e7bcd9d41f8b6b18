//! TrueMesh Store - Embedded persistence
//!
//! One sled database holds two trees:
//!
//! - `blocks`: mined blocks keyed by big-endian index, so iteration order is
//!   chain order
//! - `workflows`: the latest snapshot of every workflow, keyed by workflow id
//!
//! [`SledStore`] implements both [`BlockStore`] and [`WorkflowStore`], so a
//! node can share a single handle between the ledger and the engine.

mod error;

pub use error::{Result, StoreError};

use std::path::Path;

use async_trait::async_trait;
use truemesh_ledger::{Block, BlockStore, LedgerError};
use truemesh_types::WorkflowId;
use truemesh_workflow::{WorkflowError, WorkflowRecord, WorkflowStore};

const BLOCKS_TREE: &str = "blocks";
const WORKFLOWS_TREE: &str = "workflows";

#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    blocks: sled::Tree,
    workflows: sled::Tree,
}

impl SledStore {
    /// Open or create a database directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        tracing::info!(path = %path.display(), "Opened sled store");
        Self::from_db(db)
    }

    /// Database removed when the last handle is dropped
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let workflows = db.open_tree(WORKFLOWS_TREE)?;
        Ok(Self {
            db,
            blocks,
            workflows,
        })
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn workflow_count(&self) -> usize {
        self.workflows.len()
    }

    /// Force everything written so far to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn insert_block(&self, block: &Block) -> Result<()> {
        let value = serde_json::to_vec(block)?;
        self.blocks
            .compare_and_swap(block.index.to_be_bytes(), None as Option<&[u8]>, Some(value))?
            .map_err(|_| StoreError::Conflict {
                key: format!("block {}", block.index),
            })
    }

    fn read_blocks(&self) -> Result<Vec<Block>> {
        self.blocks
            .iter()
            .values()
            .map(|value| -> Result<Block> { Ok(serde_json::from_slice(&value?)?) })
            .collect()
    }

    fn insert_workflow(&self, id: &WorkflowId, record: &WorkflowRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        self.workflows.insert(id.to_string().as_bytes(), value)?;
        Ok(())
    }

    fn read_workflow(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>> {
        match self.workflows.get(id.to_string().as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BlockStore for SledStore {
    async fn append(&self, block: &Block) -> truemesh_ledger::Result<()> {
        self.insert_block(block).map_err(ledger_error)?;
        self.blocks.flush_async().await.map_err(|e| ledger_error(e.into()))?;
        tracing::debug!(index = block.index, hash = %block.hash, "Stored block");
        Ok(())
    }

    async fn read_all(&self) -> truemesh_ledger::Result<Vec<Block>> {
        self.read_blocks().map_err(ledger_error)
    }
}

#[async_trait]
impl WorkflowStore for SledStore {
    async fn save_workflow_state(
        &self,
        id: &WorkflowId,
        record: &WorkflowRecord,
    ) -> truemesh_workflow::Result<()> {
        self.insert_workflow(id, record).map_err(workflow_error)
    }

    async fn load_workflow_state(
        &self,
        id: &WorkflowId,
    ) -> truemesh_workflow::Result<Option<WorkflowRecord>> {
        self.read_workflow(id).map_err(workflow_error)
    }
}

fn ledger_error(e: StoreError) -> LedgerError {
    match e {
        StoreError::Serialization(e) => LedgerError::Serialization {
            message: e.to_string(),
        },
        other => LedgerError::Storage {
            message: other.to_string(),
        },
    }
}

fn workflow_error(e: StoreError) -> WorkflowError {
    WorkflowError::Store {
        message: e.to_string(),
    }
}
