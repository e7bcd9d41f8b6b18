//! The provenance ledger: record, mine, verify, query

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex, RwLock};
use truemesh_crypto::{merkle_root, verify_merkle_proof, Hash256, MerkleProof};
use truemesh_types::{SubjectId, TransactionId};

use crate::block::{Block, BlockHeader};
use crate::chain::{verify_blocks, ChainFault, ChainVerification};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::miner::{search_nonce, AutoMinerHandle, MiningHandle};
use crate::pool::PendingPool;
use crate::redact::Redactor;
use crate::store::{BlockStore, MemoryBlockStore};
use crate::transaction::{self, record_hash, Transaction};

const SYSTEM_CREATOR: &str = "system";
const GENESIS_EVENT: &str = "genesis";

/// Proof that a mined transaction is committed to by its block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub transaction_id: TransactionId,
    pub transaction_hash: Hash256,
    pub block_index: u64,
    pub block_hash: Hash256,
    pub merkle_root: Hash256,
    pub proof: MerkleProof,
}

impl InclusionProof {
    pub fn verify(&self) -> bool {
        verify_merkle_proof(self.transaction_hash, &self.proof, self.merkle_root)
    }
}

/// Summary of the chain for status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
    pub length: u64,
    pub total_transactions: u64,
    pub genesis_block_hash: Hash256,
    pub tip_hash: Hash256,
    pub tip_timestamp: DateTime<Utc>,
    pub difficulty: u32,
    pub is_valid: bool,
    pub pending_transactions: usize,
}

/// Single-writer, hash-chained provenance ledger.
///
/// Lock order is mining, then pool, then chain. Recording only touches the
/// pool and queries only read the chain, so neither waits on proof-of-work.
pub struct ProvenanceLedger {
    config: LedgerConfig,
    redactor: Redactor,
    store: Arc<dyn BlockStore>,
    pool: Mutex<PendingPool>,
    chain: RwLock<Vec<Block>>,
    /// Serializes drain + seal + append
    mining: Mutex<()>,
    /// Transaction id → (block index, position)
    locations: DashMap<TransactionId, (u64, usize)>,
}

impl ProvenanceLedger {
    /// Ledger over an in-memory block store
    pub async fn new(config: LedgerConfig) -> Result<Self> {
        Self::open(config, Arc::new(MemoryBlockStore::new())).await
    }

    /// Replay the chain held by `store`, or mine a genesis block if it is
    /// empty. A stored chain that fails verification is loaded as-is and the
    /// fault is logged; `verify_chain` keeps reporting it.
    pub async fn open(config: LedgerConfig, store: Arc<dyn BlockStore>) -> Result<Self> {
        config.validate()?;
        let ledger = Self {
            redactor: Redactor::from_config(&config),
            pool: Mutex::new(PendingPool::new(config.pool_capacity)),
            chain: RwLock::new(Vec::new()),
            mining: Mutex::new(()),
            locations: DashMap::new(),
            store,
            config,
        };

        let blocks = ledger.store.read_all().await?;
        if blocks.is_empty() {
            let genesis = ledger.mine_genesis().await?;
            ledger.store.append(&genesis).await?;
            tracing::info!(hash = %genesis.hash, "Created genesis block");
            ledger.append_to_chain(genesis).await;
        } else {
            let report = verify_blocks(&blocks, &ledger.config.genesis_hash);
            if let (Some(index), Some(fault)) = (report.first_invalid_index, &report.fault) {
                tracing::error!(block_index = index, %fault, "Stored chain failed verification");
            }
            tracing::info!(blocks = blocks.len(), "Replayed stored chain");
            for block in blocks {
                ledger.append_to_chain(block).await;
            }
        }

        Ok(ledger)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Record an event on behalf of the ledger itself
    pub async fn record_transaction(
        &self,
        subject_id: &SubjectId,
        event_type: &str,
        payload: Value,
    ) -> Result<TransactionId> {
        self.record_transaction_by(subject_id, event_type, payload, SYSTEM_CREATOR)
            .await
    }

    /// Validate, redact, hash and pool an event.
    ///
    /// Resubmitting a record whose sanitized form is already pending returns
    /// the pending transaction's id.
    pub async fn record_transaction_by(
        &self,
        subject_id: &SubjectId,
        event_type: &str,
        payload: Value,
        created_by: &str,
    ) -> Result<TransactionId> {
        transaction::validate(
            subject_id,
            event_type,
            &payload,
            self.config.max_payload_bytes,
            self.config.max_payload_depth,
        )?;
        if let Some(key) = self.redactor.find_collision(&payload) {
            return Err(LedgerError::invalid(format!(
                "payload key {key} clashes with a redacted field"
            )));
        }

        let sanitized = self.redactor.redact(&payload);
        let hash = record_hash(subject_id, event_type, &sanitized)?;
        let tx = Transaction {
            id: TransactionId::new(),
            subject_id: subject_id.clone(),
            event_type: event_type.to_string(),
            hash,
            payload: self.config.store_payloads.then_some(sanitized),
            timestamp: Utc::now(),
            node_id: self.config.node_id.clone(),
            created_by: created_by.to_string(),
        };

        let id = self.pool.lock().await.insert(tx)?;
        tracing::debug!(
            subject_id = %subject_id,
            event_type,
            transaction_id = %id,
            hash = %hash,
            "Recorded transaction"
        );
        Ok(id)
    }

    /// Seal the pending pool into a new block.
    ///
    /// Returns `Ok(None)` without touching the chain when nothing is pending.
    pub async fn mine_block(&self) -> Result<Option<Block>> {
        self.mine_with(Arc::new(AtomicBool::new(false))).await
    }

    /// Mine in the background with a cancellable handle
    pub fn start_mining(self: &Arc<Self>) -> MiningHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let ledger = Arc::clone(self);
        let flag = Arc::clone(&cancel);
        let task = tokio::spawn(async move { ledger.mine_with(flag).await });
        MiningHandle { cancel, task }
    }

    async fn mine_with(&self, cancel: Arc<AtomicBool>) -> Result<Option<Block>> {
        let _mining = self.mining.lock().await;

        let transactions = self.pool.lock().await.drain();
        if transactions.is_empty() {
            return Ok(None);
        }

        let tip = {
            let chain = self.chain.read().await;
            chain.last().map(|b| (b.index, b.hash))
        };
        let Some((tip_index, previous_hash)) = tip else {
            self.pool.lock().await.requeue_front(transactions);
            return Err(LedgerError::ChainIntegrity {
                index: 0,
                fault: ChainFault::Empty,
            });
        };

        let hashes: Vec<Hash256> = transactions.iter().map(|tx| tx.hash).collect();
        let timestamp = Utc::now();
        let header = BlockHeader {
            index: tip_index + 1,
            previous_hash,
            merkle_root: merkle_root(&hashes),
            timestamp_millis: timestamp.timestamp_millis(),
        };

        let (nonce, hash) = match self.seal(header, cancel).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(block_index = header.index, error = %e, "Mining aborted, re-queueing");
                self.pool.lock().await.requeue_front(transactions);
                return Err(e);
            }
        };

        let block = Block {
            index: header.index,
            previous_hash,
            merkle_root: header.merkle_root,
            timestamp,
            nonce,
            difficulty: self.config.difficulty,
            hash,
            transactions,
        };

        if let Err(e) = self.store.append(&block).await {
            tracing::error!(block_index = block.index, error = %e, "Failed to persist block");
            self.pool.lock().await.requeue_front(block.transactions);
            return Err(e);
        }

        tracing::info!(
            block_index = block.index,
            nonce,
            transactions = block.transactions.len(),
            hash = %block.hash,
            "Mined block"
        );
        self.append_to_chain(block.clone()).await;
        Ok(Some(block))
    }

    async fn seal(&self, header: BlockHeader, cancel: Arc<AtomicBool>) -> Result<(u64, Hash256)> {
        let difficulty = self.config.difficulty;
        tokio::task::spawn_blocking(move || search_nonce(&header, difficulty, &cancel))
            .await
            .map_err(|e| LedgerError::MiningAborted {
                reason: e.to_string(),
            })?
            .ok_or_else(|| LedgerError::MiningAborted {
                reason: "cancelled".to_string(),
            })
    }

    async fn mine_genesis(&self) -> Result<Block> {
        let payload = json!({
            "message": "TrueMesh provenance genesis",
            "node_id": self.config.node_id,
        });
        let subject = SubjectId::system();
        let tx = Transaction {
            id: TransactionId::new(),
            hash: record_hash(&subject, GENESIS_EVENT, &payload)?,
            subject_id: subject,
            event_type: GENESIS_EVENT.to_string(),
            payload: Some(payload),
            timestamp: Utc::now(),
            node_id: self.config.node_id.clone(),
            created_by: SYSTEM_CREATOR.to_string(),
        };

        let timestamp = Utc::now();
        let header = BlockHeader {
            index: 0,
            previous_hash: self.config.genesis_hash,
            merkle_root: merkle_root(&[tx.hash]),
            timestamp_millis: timestamp.timestamp_millis(),
        };
        let (nonce, hash) = self.seal(header, Arc::new(AtomicBool::new(false))).await?;

        Ok(Block {
            index: 0,
            previous_hash: header.previous_hash,
            merkle_root: header.merkle_root,
            timestamp,
            nonce,
            difficulty: self.config.difficulty,
            hash,
            transactions: vec![tx],
        })
    }

    async fn append_to_chain(&self, block: Block) {
        for (position, tx) in block.transactions.iter().enumerate() {
            self.locations.insert(tx.id, (block.index, position));
        }
        self.chain.write().await.push(block);
    }

    /// Mine every `interval` while transactions are pending, until shut down
    pub fn spawn_auto_miner(self: &Arc<Self>, interval: Duration) -> AutoMinerHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let ledger = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if ledger.pending_count().await == 0 {
                            continue;
                        }
                        if let Err(e) = ledger.mine_block().await {
                            tracing::warn!(error = %e, "Auto-miner round failed");
                        }
                    }
                    // the only value ever sent is `true`
                    _ = stop.changed() => break,
                }
            }
            tracing::debug!("Auto-miner stopped");
        });

        AutoMinerHandle { shutdown, task }
    }

    /// Check every block from genesis
    pub async fn verify_chain(&self) -> ChainVerification {
        let chain = self.chain.read().await;
        verify_blocks(&chain, &self.config.genesis_hash)
    }

    /// Like [`verify_chain`](Self::verify_chain) but as an error
    pub async fn ensure_valid(&self) -> Result<()> {
        let report = self.verify_chain().await;
        match (report.first_invalid_index, report.fault) {
            (Some(index), Some(fault)) => Err(LedgerError::ChainIntegrity { index, fault }),
            _ => Ok(()),
        }
    }

    /// Mined transactions for a subject, by block index then position
    pub async fn history(&self, subject_id: &SubjectId) -> Vec<Transaction> {
        let chain = self.chain.read().await;
        chain
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|tx| &tx.subject_id == subject_id)
            .cloned()
            .collect()
    }

    /// True when `tx_hash` is provably included in the block `block_hash`
    pub async fn verify_transaction(&self, block_hash: &Hash256, tx_hash: &Hash256) -> bool {
        let chain = self.chain.read().await;
        let Some(block) = chain.iter().find(|b| &b.hash == block_hash) else {
            return false;
        };
        match block.proof_for(tx_hash) {
            Some(proof) => verify_merkle_proof(*tx_hash, &proof, block.merkle_root),
            None => false,
        }
    }

    /// Inclusion proof for a mined transaction; `None` while pending or unknown
    pub async fn generate_proof(&self, transaction_id: &TransactionId) -> Option<InclusionProof> {
        let (block_index, position) = *self.locations.get(transaction_id)?;
        let chain = self.chain.read().await;
        let block = chain.get(usize::try_from(block_index).ok()?)?;
        let tx = block.transactions.get(position)?;
        let proof = block.merkle_tree().proof(position)?;

        Some(InclusionProof {
            transaction_id: *transaction_id,
            transaction_hash: tx.hash,
            block_index,
            block_hash: block.hash,
            merkle_root: block.merkle_root,
            proof,
        })
    }

    pub async fn block_by_hash(&self, hash: &Hash256) -> Option<Block> {
        self.chain.read().await.iter().find(|b| &b.hash == hash).cloned()
    }

    pub async fn block_by_index(&self, index: u64) -> Option<Block> {
        let position = usize::try_from(index).ok()?;
        self.chain.read().await.get(position).cloned()
    }

    /// Snapshot of the whole chain
    pub async fn blocks(&self) -> Vec<Block> {
        self.chain.read().await.clone()
    }

    pub async fn len(&self) -> u64 {
        self.chain.read().await.len() as u64
    }

    pub async fn tip_hash(&self) -> Option<Hash256> {
        self.chain.read().await.last().map(|b| b.hash)
    }

    pub async fn pending_count(&self) -> usize {
        self.pool.lock().await.len()
    }

    /// Snapshot of the pending pool in insertion order
    pub async fn pending(&self) -> Vec<Transaction> {
        self.pool.lock().await.iter().cloned().collect()
    }

    pub async fn chain_info(&self) -> ChainInfo {
        let pending_transactions = self.pending_count().await;
        let chain = self.chain.read().await;
        let verification = verify_blocks(&chain, &self.config.genesis_hash);
        let genesis = chain.first();
        let tip = chain.last();

        ChainInfo {
            length: chain.len() as u64,
            total_transactions: chain.iter().map(|b| b.transactions.len() as u64).sum(),
            genesis_block_hash: genesis.map(|b| b.hash).unwrap_or(Hash256::ZERO),
            tip_hash: tip.map(|b| b.hash).unwrap_or(Hash256::ZERO),
            tip_timestamp: tip.map(|b| b.timestamp).unwrap_or_else(Utc::now),
            difficulty: self.config.difficulty,
            is_valid: verification.ok,
            pending_transactions,
        }
    }
}
