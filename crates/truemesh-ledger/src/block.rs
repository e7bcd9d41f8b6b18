//! Blocks and block headers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use truemesh_crypto::{hash_all, merkle_root, Hash256, MerkleProof, MerkleTree};

use crate::transaction::Transaction;

/// The hashed part of a block, without the nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub index: u64,
    pub previous_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp_millis: i64,
}

impl BlockHeader {
    /// `SHA256(index ‖ previous_hash ‖ merkle_root ‖ timestamp ‖ nonce)`.
    /// Integers are big-endian, digests are their raw 32 bytes and the
    /// timestamp is milliseconds since the Unix epoch.
    pub fn hash_with_nonce(&self, nonce: u64) -> Hash256 {
        hash_all(&[
            &self.index.to_be_bytes(),
            self.previous_hash.as_bytes(),
            self.merkle_root.as_bytes(),
            &self.timestamp_millis.to_be_bytes(),
            &nonce.to_be_bytes(),
        ])
    }
}

/// A sealed batch of transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Block {
    pub index: u64,
    pub previous_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: DateTime<Utc>,
    pub nonce: u64,
    pub difficulty: u32,
    pub hash: Hash256,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            index: self.index,
            previous_hash: self.previous_hash,
            merkle_root: self.merkle_root,
            timestamp_millis: self.timestamp.timestamp_millis(),
        }
    }

    /// Hash recomputed from the stored fields
    pub fn compute_hash(&self) -> Hash256 {
        self.header().hash_with_nonce(self.nonce)
    }

    /// Leaf sequence of the Merkle tree, in stored order
    pub fn transaction_hashes(&self) -> Vec<Hash256> {
        self.transactions.iter().map(|tx| tx.hash).collect()
    }

    /// Merkle root recomputed from the stored transaction hashes
    pub fn compute_merkle_root(&self) -> Hash256 {
        merkle_root(&self.transaction_hashes())
    }

    pub fn merkle_tree(&self) -> MerkleTree {
        MerkleTree::build(&self.transaction_hashes())
    }

    /// Sibling path for the first transaction carrying `tx_hash`
    pub fn proof_for(&self, tx_hash: &Hash256) -> Option<MerkleProof> {
        let position = self.transactions.iter().position(|tx| &tx.hash == tx_hash)?;
        self.merkle_tree().proof(position)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}
