//! TrueMesh Ledger - Tamper-evident provenance ledger
//!
//! The ledger is:
//! - PII-sanitized (records are redacted before hashing)
//! - Hash-chained (every block commits to its predecessor)
//! - Merkle-proven (inclusion can be checked from a transaction hash alone)
//! - Proof-of-work sealed (difficulty is runtime configuration)
//! - Append-only (integrity failures are reported, never repaired)
//!
//! # Invariants
//!
//! 1. The chain always contains the genesis block
//! 2. `block[i].previous_hash == block[i-1].hash` for every `i > 0`
//! 3. Every stored block hash is reproducible from its fields
//! 4. Exactly one mining run may drain, seal and append at a time

pub mod block;
pub mod chain;
pub mod config;
pub mod error;
pub mod ledger;
pub mod miner;
pub mod pool;
pub mod redact;
pub mod store;
pub mod transaction;

pub use block::{Block, BlockHeader};
pub use chain::{verify_blocks, ChainFault, ChainVerification};
pub use config::{LedgerConfig, MAX_DIFFICULTY};
pub use error::{LedgerError, Result};
pub use ledger::{ChainInfo, InclusionProof, ProvenanceLedger};
pub use miner::{AutoMinerHandle, MiningHandle};
pub use pool::PendingPool;
pub use redact::Redactor;
pub use store::{BlockStore, MemoryBlockStore};
pub use transaction::Transaction;

pub use truemesh_crypto::{verify_merkle_proof as verify_proof, Hash256, MerkleProof};
