//! Ledger errors

use thiserror::Error;

use crate::chain::ChainFault;

#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Invalid transaction: {reason}")]
    InvalidTransaction { reason: String },

    #[error("Chain integrity violated at block {index}: {fault}")]
    ChainIntegrity { index: u64, fault: ChainFault },

    #[error("Mining aborted: {reason}")]
    MiningAborted { reason: String },

    #[error("Pending pool is full ({capacity} transactions)")]
    PoolFull { capacity: usize },

    #[error("Invalid ledger configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl LedgerError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        LedgerError::InvalidTransaction {
            reason: reason.into(),
        }
    }
}

impl From<truemesh_crypto::CryptoError> for LedgerError {
    fn from(e: truemesh_crypto::CryptoError) -> Self {
        LedgerError::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization {
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
