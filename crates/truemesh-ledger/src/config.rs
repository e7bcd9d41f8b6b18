//! Ledger configuration

use serde::{Deserialize, Serialize};
use truemesh_crypto::Hash256;

use crate::error::{LedgerError, Result};
use crate::redact::DEFAULT_PII_KEYS;

/// Highest accepted difficulty. Beyond this the nonce space is
/// effectively exhausted before a block can be sealed.
pub const MAX_DIFFICULTY: u32 = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Required leading zero bits of every block hash. 0 accepts any nonce.
    pub difficulty: u32,
    /// Maximum number of transactions waiting in the pending pool
    pub pool_capacity: usize,
    /// `previous_hash` of the genesis block
    pub genesis_hash: Hash256,
    /// Salt mixed into hashed PII values
    pub redaction_salt: String,
    /// Payload keys whose values are replaced by a salted hash
    pub pii_keys: Vec<String>,
    /// Keep the redacted payload on the transaction (needed to recheck hashes)
    pub store_payloads: bool,
    /// Maximum encoded size of one payload
    pub max_payload_bytes: usize,
    /// Maximum nesting depth of one payload
    pub max_payload_depth: usize,
    /// Originating node stamped on every transaction
    pub node_id: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: 4,
            pool_capacity: 10_000,
            genesis_hash: Hash256::ZERO,
            redaction_salt: "truemesh".to_string(),
            pii_keys: DEFAULT_PII_KEYS.iter().map(|k| k.to_string()).collect(),
            store_payloads: true,
            max_payload_bytes: 64 * 1024,
            max_payload_depth: 32,
            node_id: "node-1".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Configuration for tests: no proof-of-work
    pub fn for_testing() -> Self {
        Self {
            difficulty: 0,
            ..Self::default()
        }
    }

    /// Reject settings the ledger cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidConfig {
                reason: format!(
                    "difficulty {} exceeds the maximum of {MAX_DIFFICULTY}",
                    self.difficulty
                ),
            });
        }
        if self.pool_capacity == 0 {
            return Err(LedgerError::InvalidConfig {
                reason: "pool_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
