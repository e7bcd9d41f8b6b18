//! TrueMesh Crypto - Hashing primitives for the provenance ledger
//!
//! This crate provides:
//! - A typed 32-byte SHA-256 digest ([`Hash256`])
//! - Canonical JSON encoding, so identical logical payloads hash identically
//! - Merkle trees with inclusion proofs

pub mod canonical;
pub mod hash;
pub mod merkle;

pub use canonical::*;
pub use hash::*;
pub use merkle::*;

use thiserror::Error;

/// Hashing and encoding errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Value cannot be canonically encoded: {0}")]
    NotCanonical(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
