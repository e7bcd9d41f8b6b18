//! Durable storage seam for blocks

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::block::Block;
use crate::error::Result;

/// Append-only block persistence
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Persist a newly mined block. Called before the block becomes visible.
    async fn append(&self, block: &Block) -> Result<()>;

    /// Every stored block in index order
    async fn read_all(&self) -> Result<Vec<Block>>;
}

/// Blocks kept in process memory
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<Vec<Block>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing chain, e.g. a snapshot taken from another store
    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks: RwLock::new(blocks),
        }
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn append(&self, block: &Block) -> Result<()> {
        self.blocks.write().await.push(block.clone());
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Block>> {
        Ok(self.blocks.read().await.clone())
    }
}
