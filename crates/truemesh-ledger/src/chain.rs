//! Whole-chain integrity verification

use std::fmt;

use serde::{Deserialize, Serialize};
use truemesh_crypto::Hash256;
use truemesh_types::TransactionId;

use crate::block::Block;

/// The first check a block failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainFault {
    /// The chain has no genesis block
    Empty,
    IndexGap { expected: u64, found: u64 },
    GenesisLinkage { expected: Hash256, found: Hash256 },
    PreviousHashMismatch { expected: Hash256, found: Hash256 },
    HashMismatch { stored: Hash256, computed: Hash256 },
    DifficultyNotMet { difficulty: u32 },
    MerkleRootMismatch { stored: Hash256, computed: Hash256 },
    TransactionHashMismatch { transaction_id: TransactionId },
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFault::Empty => write!(f, "chain has no genesis block"),
            ChainFault::IndexGap { expected, found } => {
                write!(f, "expected index {expected}, found {found}")
            }
            ChainFault::GenesisLinkage { expected, found } => {
                write!(f, "genesis previous hash {found} is not {expected}")
            }
            ChainFault::PreviousHashMismatch { expected, found } => {
                write!(f, "previous hash {found} does not link to {expected}")
            }
            ChainFault::HashMismatch { stored, computed } => {
                write!(f, "stored hash {stored} but fields hash to {computed}")
            }
            ChainFault::DifficultyNotMet { difficulty } => {
                write!(f, "hash has fewer than {difficulty} leading zero bits")
            }
            ChainFault::MerkleRootMismatch { stored, computed } => {
                write!(f, "stored merkle root {stored} but transactions give {computed}")
            }
            ChainFault::TransactionHashMismatch { transaction_id } => {
                write!(f, "transaction {transaction_id} payload does not match its hash")
            }
        }
    }
}

/// Outcome of [`verify_blocks`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub ok: bool,
    pub first_invalid_index: Option<u64>,
    pub fault: Option<ChainFault>,
    pub blocks_checked: u64,
}

impl ChainVerification {
    fn valid(blocks_checked: u64) -> Self {
        Self {
            ok: true,
            first_invalid_index: None,
            fault: None,
            blocks_checked,
        }
    }

    fn invalid(index: u64, fault: ChainFault) -> Self {
        Self {
            ok: false,
            first_invalid_index: Some(index),
            fault: Some(fault),
            blocks_checked: index,
        }
    }
}

/// Check one block against its predecessor (or the genesis hash)
pub fn check_block(
    block: &Block,
    position: u64,
    previous: Option<&Block>,
    genesis_hash: &Hash256,
) -> Result<(), ChainFault> {
    if block.index != position {
        return Err(ChainFault::IndexGap {
            expected: position,
            found: block.index,
        });
    }

    match previous {
        None if &block.previous_hash != genesis_hash => {
            return Err(ChainFault::GenesisLinkage {
                expected: *genesis_hash,
                found: block.previous_hash,
            });
        }
        Some(prev) if block.previous_hash != prev.hash => {
            return Err(ChainFault::PreviousHashMismatch {
                expected: prev.hash,
                found: block.previous_hash,
            });
        }
        _ => {}
    }

    let computed = block.compute_hash();
    if computed != block.hash {
        return Err(ChainFault::HashMismatch {
            stored: block.hash,
            computed,
        });
    }
    if !block.hash.meets_difficulty(block.difficulty) {
        return Err(ChainFault::DifficultyNotMet {
            difficulty: block.difficulty,
        });
    }

    let root = block.compute_merkle_root();
    if root != block.merkle_root {
        return Err(ChainFault::MerkleRootMismatch {
            stored: block.merkle_root,
            computed: root,
        });
    }

    if let Some(tx) = block.transactions.iter().find(|tx| !tx.hash_is_consistent()) {
        return Err(ChainFault::TransactionHashMismatch {
            transaction_id: tx.id,
        });
    }

    Ok(())
}

/// Verify a chain from genesis, stopping at the first faulty block
pub fn verify_blocks(blocks: &[Block], genesis_hash: &Hash256) -> ChainVerification {
    if blocks.is_empty() {
        return ChainVerification::invalid(0, ChainFault::Empty);
    }

    let mut previous: Option<&Block> = None;
    for (position, block) in blocks.iter().enumerate() {
        let position = position as u64;
        if let Err(fault) = check_block(block, position, previous, genesis_hash) {
            tracing::warn!(block_index = position, %fault, "Chain integrity check failed");
            return ChainVerification::invalid(position, fault);
        }
        previous = Some(block);
    }

    ChainVerification::valid(blocks.len() as u64)
}
