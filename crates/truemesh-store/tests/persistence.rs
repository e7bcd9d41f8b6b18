//! Ledger and workflow state survive a restart

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use truemesh_agents::{register_reference_agents, AgentThresholds, CapabilityRegistry};
use truemesh_ledger::{LedgerConfig, ProvenanceLedger};
use truemesh_store::SledStore;
use truemesh_types::SubjectId;
use truemesh_workflow::{EngineConfig, WorkflowEngine, WorkflowState};

#[tokio::test]
async fn test_chain_is_replayed_after_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let (tip, tx_id) = {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let ledger = ProvenanceLedger::open(LedgerConfig::for_testing(), store.clone())
            .await
            .unwrap();
        let tx_id = ledger
            .record_transaction(&SubjectId::new("P1"), "verify", json!({ "ok": true }))
            .await
            .unwrap();
        ledger.mine_block().await.unwrap();
        ledger
            .record_transaction(&SubjectId::new("P1"), "fraud_check", json!({ "score": 0.1 }))
            .await
            .unwrap();
        ledger.mine_block().await.unwrap();
        store.flush().await.unwrap();
        (ledger.tip_hash().await.unwrap(), tx_id)
    };

    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    assert_eq!(store.block_count(), 3);
    let ledger = ProvenanceLedger::open(LedgerConfig::for_testing(), store)
        .await
        .unwrap();

    assert_eq!(ledger.len().await, 3);
    assert_eq!(ledger.tip_hash().await, Some(tip));
    assert!(ledger.verify_chain().await.ok);
    assert!(ledger.generate_proof(&tx_id).await.unwrap().verify());

    let events: Vec<String> = ledger
        .history(&SubjectId::new("P1"))
        .await
        .into_iter()
        .map(|tx| tx.event_type)
        .collect();
    assert_eq!(events, vec!["verify", "fraud_check"]);
}

#[tokio::test]
async fn test_finished_workflow_is_readable_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    let workflow_id = {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let ledger = Arc::new(
            ProvenanceLedger::open(LedgerConfig::for_testing(), store.clone())
                .await
                .unwrap(),
        );
        let mut registry = CapabilityRegistry::default();
        register_reference_agents(&mut registry, &AgentThresholds::default()).unwrap();
        let engine = WorkflowEngine::new(
            Arc::new(registry),
            ledger.clone(),
            store.clone(),
            EngineConfig::default(),
        );

        let id = engine
            .submit(
                SubjectId::new("P1"),
                json!({
                    "registration_number": "MCI123456",
                    "name": "Dr. Asha Rao",
                    "provider_type": "doctor",
                    "city": "Pune",
                    "state": "MH",
                }),
            )
            .await
            .unwrap();
        assert_eq!(engine.wait(&id).await.unwrap().state, WorkflowState::Completed);
        ledger.mine_block().await.unwrap();
        store.flush().await.unwrap();

        // the run task holds a database handle until it exits
        while !engine.live_workflows().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        id
    };

    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let ledger = Arc::new(
        ProvenanceLedger::open(LedgerConfig::for_testing(), store.clone())
            .await
            .unwrap(),
    );
    let engine = WorkflowEngine::new(
        Arc::new(CapabilityRegistry::default()),
        ledger.clone(),
        store,
        EngineConfig::default(),
    );

    let status = engine.status(&workflow_id).await.unwrap();
    assert_eq!(status.state, WorkflowState::Completed);
    for tx_id in status.transaction_ids() {
        assert!(ledger.generate_proof(&tx_id).await.is_some());
    }
}
