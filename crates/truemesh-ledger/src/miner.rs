//! Proof-of-work search and the handles for background mining

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use truemesh_crypto::Hash256;

use crate::block::{Block, BlockHeader};
use crate::error::{LedgerError, Result};

/// Nonces tried between two looks at the cancel flag
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Search nonces upward from 0 until the header hash has `difficulty`
/// leading zero bits. Returns `None` once `cancel` is set.
///
/// CPU bound; run it on a blocking worker.
pub fn search_nonce(header: &BlockHeader, difficulty: u32, cancel: &AtomicBool) -> Option<(u64, Hash256)> {
    let mut nonce: u64 = 0;
    loop {
        if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return None;
        }
        let hash = header.hash_with_nonce(nonce);
        if hash.meets_difficulty(difficulty) {
            return Some((nonce, hash));
        }
        nonce = nonce.checked_add(1)?;
    }
}

/// A mining run in flight.
///
/// Cancelling puts the drained transactions back at the front of the pending
/// pool and the run resolves to [`LedgerError::MiningAborted`].
#[derive(Debug)]
pub struct MiningHandle {
    pub(crate) cancel: Arc<AtomicBool>,
    pub(crate) task: JoinHandle<Result<Option<Block>>>,
}

impl MiningHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run. `Ok(None)` means the pool was empty.
    pub async fn join(self) -> Result<Option<Block>> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(LedgerError::MiningAborted {
                reason: e.to_string(),
            }),
        }
    }
}

/// Background miner started by `ProvenanceLedger::spawn_auto_miner`
#[derive(Debug)]
pub struct AutoMinerHandle {
    pub(crate) shutdown: watch::Sender<bool>,
    pub(crate) task: JoinHandle<()>,
}

impl AutoMinerHandle {
    /// Stop after the current round and wait for the loop to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Auto-miner task ended abnormally");
        }
    }
}
