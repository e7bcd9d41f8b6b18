//! Storage errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Key already written: {key}")]
    Conflict { key: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
