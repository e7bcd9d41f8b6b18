//! Pending pool: insertion-ordered, hash-deduplicated, bounded

use std::collections::{HashMap, VecDeque};

use truemesh_crypto::Hash256;
use truemesh_types::TransactionId;

use crate::error::{LedgerError, Result};
use crate::transaction::Transaction;

#[derive(Debug)]
pub struct PendingPool {
    capacity: usize,
    queue: VecDeque<Transaction>,
    by_hash: HashMap<Hash256, TransactionId>,
}

impl PendingPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: VecDeque::new(),
            by_hash: HashMap::new(),
        }
    }

    /// Id of a pending transaction with this hash
    pub fn find(&self, hash: &Hash256) -> Option<TransactionId> {
        self.by_hash.get(hash).copied()
    }

    /// Append a transaction. An identical hash already pending returns the
    /// existing id and drops `tx`.
    pub fn insert(&mut self, tx: Transaction) -> Result<TransactionId> {
        if let Some(existing) = self.find(&tx.hash) {
            return Ok(existing);
        }
        if self.queue.len() >= self.capacity {
            return Err(LedgerError::PoolFull {
                capacity: self.capacity,
            });
        }
        let id = tx.id;
        self.by_hash.insert(tx.hash, id);
        self.queue.push_back(tx);
        Ok(id)
    }

    /// Take every pending transaction in insertion order
    pub fn drain(&mut self) -> Vec<Transaction> {
        self.by_hash.clear();
        self.queue.drain(..).collect()
    }

    /// Put drained transactions back ahead of anything recorded since.
    ///
    /// Capacity is not enforced here; a transaction that was accepted once is
    /// never dropped.
    pub fn requeue_front(&mut self, txs: Vec<Transaction>) {
        for tx in txs.into_iter().rev() {
            self.by_hash.entry(tx.hash).or_insert(tx.id);
            self.queue.push_front(tx);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.queue.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use truemesh_crypto::sha256;
    use truemesh_types::SubjectId;

    fn tx(seed: &[u8]) -> Transaction {
        Transaction {
            id: TransactionId::new(),
            subject_id: SubjectId::new("P1"),
            event_type: "verify".to_string(),
            hash: sha256(seed),
            payload: None,
            timestamp: Utc::now(),
            node_id: "node-1".to_string(),
            created_by: "test".to_string(),
        }
    }

    #[test]
    fn test_dedup_by_hash() {
        let mut pool = PendingPool::new(10);
        let first = pool.insert(tx(b"a")).unwrap();
        let again = pool.insert(tx(b"a")).unwrap();
        assert_eq!(first, again);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_capacity() {
        let mut pool = PendingPool::new(1);
        pool.insert(tx(b"a")).unwrap();
        assert!(matches!(pool.insert(tx(b"b")), Err(LedgerError::PoolFull { capacity: 1 })));
        // a duplicate of a pending record is still accepted when full
        assert!(pool.insert(tx(b"a")).is_ok());
    }

    #[test]
    fn test_requeue_goes_first() {
        let mut pool = PendingPool::new(10);
        pool.insert(tx(b"a")).unwrap();
        pool.insert(tx(b"b")).unwrap();
        let drained = pool.drain();
        assert!(pool.is_empty());

        pool.insert(tx(b"c")).unwrap();
        pool.requeue_front(drained);
        let order: Vec<Hash256> = pool.iter().map(|t| t.hash).collect();
        assert_eq!(order, vec![sha256(b"a"), sha256(b"b"), sha256(b"c")]);
        assert!(pool.find(&sha256(b"a")).is_some());
    }
}
