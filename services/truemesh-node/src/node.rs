//! Wiring: storage, ledger, registry and engine built from a [`NodeConfig`]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Serialize;
use serde_json::{json, Value};
use truemesh_agents::{register_reference_agents, CapabilityRegistry};
use truemesh_ledger::{Block, BlockStore, ChainVerification, MemoryBlockStore, ProvenanceLedger};
use truemesh_store::SledStore;
use truemesh_types::SubjectId;
use truemesh_workflow::{MemoryWorkflowStore, WorkflowEngine, WorkflowStore};

use crate::config::{NodeConfig, StorageBackend};

pub struct Node {
    pub ledger: Arc<ProvenanceLedger>,
    pub engine: WorkflowEngine,
    sled: Option<SledStore>,
    mining_interval: Option<Duration>,
}

/// What `run` prints
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub workflows: usize,
    pub states: BTreeMap<String, usize>,
    pub transactions: usize,
    pub blocks_mined: Vec<BlockSummary>,
    pub chain_length: u64,
    pub chain: ChainVerification,
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct BlockSummary {
    pub index: u64,
    pub hash: String,
    pub previous_hash: String,
    pub merkle_root: String,
    pub nonce: u64,
    pub transactions: usize,
}

impl From<&Block> for BlockSummary {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index,
            hash: block.hash.to_hex(),
            previous_hash: block.previous_hash.to_hex(),
            merkle_root: block.merkle_root.to_hex(),
            nonce: block.nonce,
            transactions: block.transactions.len(),
        }
    }
}

impl Node {
    pub async fn start(config: &NodeConfig) -> anyhow::Result<Self> {
        let (blocks, workflows, sled): (Arc<dyn BlockStore>, Arc<dyn WorkflowStore>, _) =
            match config.node.storage {
                StorageBackend::Memory => (
                    Arc::new(MemoryBlockStore::new()),
                    Arc::new(MemoryWorkflowStore::new()),
                    None,
                ),
                StorageBackend::Sled => {
                    let store = SledStore::open(&config.node.data_dir).with_context(|| {
                        format!("opening sled store at {}", config.node.data_dir.display())
                    })?;
                    let shared = Arc::new(store.clone());
                    (shared.clone(), shared, Some(store))
                }
            };

        let ledger = Arc::new(ProvenanceLedger::open(config.ledger.clone(), blocks).await?);

        let mut registry = CapabilityRegistry::new(config.registry.clone());
        register_reference_agents(&mut registry, &config.agents)?;

        let engine = WorkflowEngine::new(
            Arc::new(registry),
            Arc::clone(&ledger),
            workflows,
            config.engine.clone(),
        );

        tracing::info!(
            storage = ?config.node.storage,
            node_id = %config.ledger.node_id,
            difficulty = config.ledger.difficulty,
            chain_length = ledger.len().await,
            "Node started"
        );

        Ok(Self {
            ledger,
            engine,
            sled,
            mining_interval: config.node.mining_interval_ms.map(Duration::from_millis),
        })
    }

    /// Submit `count` workflows for synthetic providers, wait for all of
    /// them, seal what is pending and verify the chain
    pub async fn run_workflows(
        &self,
        count: usize,
        pipeline: Option<&str>,
    ) -> anyhow::Result<RunSummary> {
        let started = Instant::now();
        let miner = self
            .mining_interval
            .map(|interval| self.ledger.spawn_auto_miner(interval));
        let first_new_block = self.ledger.len().await;

        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let subject = SubjectId::new(format!("P{}", i + 1));
            let payload = synthetic_provider(i);
            let id = match pipeline {
                Some(name) => self.engine.submit_with(name, subject, payload).await?,
                None => self.engine.submit(subject, payload).await?,
            };
            ids.push(id);
        }

        let statuses = futures::future::join_all(ids.iter().map(|id| self.engine.wait(id))).await;
        let mut states = BTreeMap::new();
        let mut transactions = 0;
        for status in statuses {
            let status = status?;
            transactions += status.transaction_ids().len();
            let state = serde_json::to_value(status.state)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            *states.entry(state).or_insert(0) += 1;
        }

        if let Some(miner) = miner {
            miner.shutdown().await;
        }
        self.ledger.mine_block().await?;
        self.flush().await?;

        let blocks_mined = self
            .ledger
            .blocks()
            .await
            .iter()
            .filter(|b| b.index >= first_new_block)
            .map(BlockSummary::from)
            .collect();

        Ok(RunSummary {
            workflows: count,
            states,
            transactions,
            blocks_mined,
            chain_length: self.ledger.len().await,
            chain: self.ledger.verify_chain().await,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    pub async fn history(&self, subject: &str) -> anyhow::Result<Value> {
        let history = self.ledger.history(&SubjectId::new(subject)).await;
        Ok(json!({
            "subject_id": subject,
            "transactions": history,
        }))
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        if let Some(store) = &self.sled {
            store.flush().await?;
        }
        Ok(())
    }
}

/// Provider records for `run`. Every tenth one carries a placeholder
/// registration number so the fraud and compliance paths get exercised.
pub fn synthetic_provider(i: usize) -> Value {
    let registration_number = if i % 10 == 9 {
        "123456".to_string()
    } else {
        format!("MCI{:06}", 100_000 + i)
    };
    json!({
        "registration_number": registration_number,
        "name": format!("Dr. Provider {}", i + 1),
        "provider_type": if i % 3 == 0 { "hospital" } else { "doctor" },
        "email": format!("provider{}@clinic.example", i + 1),
        "phone": format!("+91-98765{:05}", i % 100_000),
        "city": "Pune",
        "state": "MH",
    })
}
