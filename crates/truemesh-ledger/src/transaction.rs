//! Ledger transactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use truemesh_crypto::{canonical_hash, Hash256};
use truemesh_types::{SubjectId, TransactionId};

use crate::error::{LedgerError, Result};

/// A sanitized, hashed ledger event.
///
/// `hash = SHA256(canonical({"event_type", "payload", "subject_id"}))` over
/// the redacted payload. Identity inside the pending pool is by hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    pub id: TransactionId,
    pub subject_id: SubjectId,
    pub event_type: String,
    pub hash: Hash256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub created_by: String,
}

/// Hash of a sanitized record
pub fn record_hash(subject_id: &SubjectId, event_type: &str, payload: &Value) -> Result<Hash256> {
    Ok(canonical_hash(&json!({
        "event_type": event_type,
        "payload": payload,
        "subject_id": subject_id,
    }))?)
}

impl Transaction {
    /// Recompute the hash from the stored payload; `None` when no payload was kept
    pub fn recompute_hash(&self) -> Option<Result<Hash256>> {
        self.payload
            .as_ref()
            .map(|p| record_hash(&self.subject_id, &self.event_type, p))
    }

    /// False only when a stored payload no longer matches the stored hash
    pub fn hash_is_consistent(&self) -> bool {
        match self.recompute_hash() {
            None => true,
            Some(Ok(h)) => h == self.hash,
            Some(Err(_)) => false,
        }
    }
}

/// Depth of a JSON tree; scalars have depth 0
pub(crate) fn depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Reject payloads that cannot enter the ledger
pub(crate) fn validate(
    subject_id: &SubjectId,
    event_type: &str,
    payload: &Value,
    max_bytes: usize,
    max_depth: usize,
) -> Result<()> {
    if subject_id.as_str().trim().is_empty() {
        return Err(LedgerError::invalid("subject id is empty"));
    }
    if event_type.trim().is_empty() {
        return Err(LedgerError::invalid("event type is empty"));
    }
    if !payload.is_object() {
        return Err(LedgerError::invalid("payload must be a JSON object"));
    }
    let d = depth(payload);
    if d > max_depth {
        return Err(LedgerError::invalid(format!(
            "payload nesting depth {d} exceeds {max_depth}"
        )));
    }
    let size = serde_json::to_vec(payload)?.len();
    if size > max_bytes {
        return Err(LedgerError::invalid(format!(
            "payload is {size} bytes, limit is {max_bytes}"
        )));
    }
    Ok(())
}
