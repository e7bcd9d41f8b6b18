//! Chain integrity, tamper evidence and inclusion proofs

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use truemesh_crypto::{sha256, Hash256};
use truemesh_ledger::{
    verify_blocks, Block, BlockStore, ChainFault, LedgerConfig, LedgerError, MemoryBlockStore,
    ProvenanceLedger,
};
use truemesh_types::SubjectId;

async fn ledger_with_blocks(blocks: usize, per_block: usize) -> ProvenanceLedger {
    let ledger = ProvenanceLedger::new(LedgerConfig::for_testing()).await.unwrap();
    for b in 0..blocks {
        for t in 0..per_block {
            ledger
                .record_transaction(
                    &SubjectId::new(format!("P{t}")),
                    "verify",
                    json!({ "block": b, "n": t }),
                )
                .await
                .unwrap();
        }
        ledger.mine_block().await.unwrap();
    }
    ledger
}

fn genesis() -> Hash256 {
    LedgerConfig::for_testing().genesis_hash
}

#[tokio::test]
async fn test_recorded_and_mined_chain_verifies() {
    for per_block in [1, 2, 3, 7] {
        let ledger = ledger_with_blocks(3, per_block).await;
        let report = ledger.verify_chain().await;
        assert!(report.ok, "per_block={per_block}: {report:?}");
        assert_eq!(report.first_invalid_index, None);
        assert_eq!(ledger.len().await, 4);
    }
}

#[tokio::test]
async fn test_single_transaction_root_is_its_hash() {
    let ledger = ledger_with_blocks(1, 1).await;
    let block = ledger.block_by_index(1).await.unwrap();
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(block.merkle_root, block.transactions[0].hash);
}

#[tokio::test]
async fn test_tampering_is_located() {
    let ledger = ledger_with_blocks(3, 3).await;
    let pristine = ledger.blocks().await;

    let tampers: Vec<(&str, Box<dyn Fn(&mut Block)>)> = vec![
        ("hash", Box::new(|b: &mut Block| b.hash = sha256(b"forged"))),
        ("previous_hash", Box::new(|b: &mut Block| b.previous_hash = sha256(b"forged"))),
        ("merkle_root", Box::new(|b: &mut Block| b.merkle_root = sha256(b"forged"))),
        (
            "transaction hash",
            Box::new(|b: &mut Block| b.transactions[1].hash = sha256(b"forged")),
        ),
        (
            "transaction payload",
            Box::new(|b: &mut Block| b.transactions[0].payload = Some(json!({ "forged": true }))),
        ),
    ];

    for target in 1..pristine.len() {
        for (field, tamper) in &tampers {
            let mut blocks = pristine.clone();
            tamper(&mut blocks[target]);
            let report = verify_blocks(&blocks, &genesis());
            assert!(!report.ok, "{field} on block {target} went unnoticed");
            assert_eq!(report.first_invalid_index, Some(target as u64), "{field}");
        }
    }
}

#[tokio::test]
async fn test_payload_tamper_names_the_transaction() {
    let ledger = ledger_with_blocks(1, 2).await;
    let mut blocks = ledger.blocks().await;
    let victim = blocks[1].transactions[1].id;
    blocks[1].transactions[1].payload = Some(json!({ "block": 0, "n": 99 }));

    let report = verify_blocks(&blocks, &genesis());
    assert_eq!(
        report.fault,
        Some(ChainFault::TransactionHashMismatch { transaction_id: victim })
    );
}

#[tokio::test]
async fn test_wrong_genesis_hash_is_reported() {
    let ledger = ledger_with_blocks(1, 1).await;
    let report = verify_blocks(&ledger.blocks().await, &sha256(b"other network"));
    assert_eq!(report.first_invalid_index, Some(0));
    assert!(matches!(report.fault, Some(ChainFault::GenesisLinkage { .. })));
}

#[tokio::test]
async fn test_removed_block_is_an_index_gap() {
    let ledger = ledger_with_blocks(3, 1).await;
    let mut blocks = ledger.blocks().await;
    blocks.remove(2);
    let report = verify_blocks(&blocks, &genesis());
    assert_eq!(report.first_invalid_index, Some(2));
    assert_eq!(
        report.fault,
        Some(ChainFault::IndexGap { expected: 2, found: 3 })
    );
}

#[tokio::test]
async fn test_reopened_tampered_store_is_reported_not_repaired() {
    let ledger = ledger_with_blocks(2, 2).await;
    let mut blocks = ledger.blocks().await;
    blocks[2].merkle_root = sha256(b"forged");

    let store = Arc::new(MemoryBlockStore::with_blocks(blocks));
    let reopened = ProvenanceLedger::open(LedgerConfig::for_testing(), store.clone())
        .await
        .unwrap();

    let report = reopened.verify_chain().await;
    assert_eq!(report.first_invalid_index, Some(2));
    assert!(matches!(
        reopened.ensure_valid().await,
        Err(LedgerError::ChainIntegrity { index: 2, .. })
    ));
    // nothing was rewritten
    assert_eq!(store.read_all().await.unwrap()[2].merkle_root, sha256(b"forged"));
    assert!(!reopened.chain_info().await.is_valid);
}

#[tokio::test]
async fn test_reopen_replays_chain() {
    let store = Arc::new(MemoryBlockStore::new());
    let ledger = ProvenanceLedger::open(LedgerConfig::for_testing(), store.clone())
        .await
        .unwrap();
    let subject = SubjectId::new("P1");
    let id = ledger
        .record_transaction(&subject, "verify", json!({ "ok": true }))
        .await
        .unwrap();
    ledger.mine_block().await.unwrap();
    let tip = ledger.tip_hash().await;

    let reopened = ProvenanceLedger::open(LedgerConfig::for_testing(), store)
        .await
        .unwrap();
    assert_eq!(reopened.len().await, 2);
    assert_eq!(reopened.tip_hash().await, tip);
    assert_eq!(reopened.history(&subject).await[0].id, id);
    assert!(reopened.generate_proof(&id).await.unwrap().verify());
}

#[tokio::test]
async fn test_inclusion() {
    let ledger = ledger_with_blocks(2, 5).await;
    let blocks = ledger.blocks().await;

    for block in &blocks {
        for tx in &block.transactions {
            assert!(ledger.verify_transaction(&block.hash, &tx.hash).await);
        }
    }

    assert!(!ledger.verify_transaction(&blocks[1].hash, &sha256(b"never mined")).await);
    // a real transaction checked against the wrong block
    let other = blocks[2].transactions[0].hash;
    assert!(!ledger.verify_transaction(&blocks[1].hash, &other).await);
    assert!(!ledger.verify_transaction(&sha256(b"no such block"), &other).await);
}

#[tokio::test]
async fn test_mining_empty_pool_is_noop() {
    let ledger = ledger_with_blocks(1, 2).await;
    let len = ledger.len().await;
    let tip = ledger.tip_hash().await;

    assert!(ledger.mine_block().await.unwrap().is_none());
    assert_eq!(ledger.len().await, len);
    assert_eq!(ledger.tip_hash().await, tip);
}

#[tokio::test]
async fn test_history_order() {
    let ledger = ProvenanceLedger::new(LedgerConfig::for_testing()).await.unwrap();
    let p1 = SubjectId::new("P1");
    let p2 = SubjectId::new("P2");

    let a = ledger.record_transaction(&p1, "verify", json!({"n": 1})).await.unwrap();
    ledger.record_transaction(&p2, "verify", json!({"n": 2})).await.unwrap();
    let b = ledger.record_transaction(&p1, "fraud_check", json!({"n": 3})).await.unwrap();
    ledger.mine_block().await.unwrap();
    let c = ledger.record_transaction(&p1, "compliance_check", json!({"n": 4})).await.unwrap();
    ledger.mine_block().await.unwrap();

    let history: Vec<_> = ledger.history(&p1).await.into_iter().map(|tx| tx.id).collect();
    assert_eq!(history, vec![a, b, c]);
}

#[tokio::test]
async fn test_cancelled_mining_requeues_pool() {
    // seed a chain cheaply, then reopen it with an unreachable difficulty
    let seed = ProvenanceLedger::new(LedgerConfig::for_testing()).await.unwrap();
    let store = Arc::new(MemoryBlockStore::with_blocks(seed.blocks().await));
    let config = LedgerConfig {
        difficulty: 120,
        ..LedgerConfig::for_testing()
    };
    let ledger = Arc::new(ProvenanceLedger::open(config, store).await.unwrap());

    let subject = SubjectId::new("P1");
    let mut ids = Vec::new();
    for n in 0..3 {
        ids.push(
            ledger
                .record_transaction(&subject, "verify", json!({ "n": n }))
                .await
                .unwrap(),
        );
    }

    let handle = ledger.start_mining();
    tokio::time::timeout(Duration::from_secs(5), async {
        while ledger.pending_count().await != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("miner never drained the pool");

    // a record made while mining lands behind the re-queued ones
    let late = ledger
        .record_transaction(&subject, "verify", json!({ "n": "late" }))
        .await
        .unwrap();

    handle.cancel();
    let result = handle.join().await;
    assert!(matches!(result, Err(LedgerError::MiningAborted { .. })));

    let pending: Vec<_> = ledger.pending().await.into_iter().map(|tx| tx.id).collect();
    ids.push(late);
    assert_eq!(pending, ids);
    assert_eq!(ledger.len().await, 1);
}

#[tokio::test]
async fn test_auto_miner_seals_pending_transactions() {
    let ledger = Arc::new(ProvenanceLedger::new(LedgerConfig::for_testing()).await.unwrap());
    let miner = ledger.spawn_auto_miner(Duration::from_millis(10));

    ledger
        .record_transaction(&SubjectId::new("P1"), "verify", json!({ "ok": true }))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while ledger.len().await < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("auto-miner never mined");

    miner.shutdown().await;
    assert_eq!(ledger.pending_count().await, 0);
    assert!(ledger.verify_chain().await.ok);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_records_all_land_in_one_block() {
    let ledger = Arc::new(ProvenanceLedger::new(LedgerConfig::for_testing()).await.unwrap());

    let mut tasks = Vec::new();
    for n in 0..50 {
        let ledger = Arc::clone(&ledger);
        tasks.push(tokio::spawn(async move {
            ledger
                .record_transaction(&SubjectId::new(format!("P{n}")), "verify", json!({ "n": n }))
                .await
                .unwrap()
        }));
    }
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }

    let block = ledger.mine_block().await.unwrap().unwrap();
    assert_eq!(block.transactions.len(), 50);
    for id in &ids {
        assert!(block.transactions.iter().any(|tx| &tx.id == id));
    }
    assert!(ledger.verify_chain().await.ok);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_miners_seal_each_transaction_once() {
    let config = LedgerConfig {
        difficulty: 8,
        ..LedgerConfig::for_testing()
    };
    let ledger = Arc::new(ProvenanceLedger::new(config).await.unwrap());

    let mut writers = Vec::new();
    for w in 0..4 {
        let ledger = Arc::clone(&ledger);
        writers.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for n in 0..25 {
                let subject = SubjectId::new(format!("P{w}"));
                ids.push(
                    ledger
                        .record_transaction(&subject, "verify", json!({ "writer": w, "n": n }))
                        .await
                        .unwrap(),
                );
                tokio::task::yield_now().await;
            }
            ids
        }));
    }

    let mut miners = Vec::new();
    for m in 0..3 {
        let ledger = Arc::clone(&ledger);
        miners.push(tokio::spawn(async move {
            for _ in 0..15 {
                if m == 0 {
                    ledger.start_mining().join().await.unwrap();
                } else {
                    ledger.mine_block().await.unwrap();
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }));
    }

    let mut expected = Vec::new();
    for writer in writers {
        expected.extend(writer.await.unwrap());
    }
    for miner in miners {
        miner.await.unwrap();
    }
    ledger.mine_block().await.unwrap();
    assert_eq!(ledger.pending_count().await, 0);

    let blocks = ledger.blocks().await;
    let mut sealed = Vec::new();
    for (position, block) in blocks.iter().enumerate() {
        assert_eq!(block.index, position as u64);
        if position > 0 {
            assert_eq!(block.previous_hash, blocks[position - 1].hash);
            sealed.extend(block.transactions.iter().map(|tx| tx.id));
        }
    }
    assert_eq!(sealed.len(), 100);
    let unique: std::collections::HashSet<_> = sealed.iter().copied().collect();
    assert_eq!(unique.len(), 100);
    assert!(expected.iter().all(|id| unique.contains(id)));
    assert!(ledger.verify_chain().await.ok);
}
