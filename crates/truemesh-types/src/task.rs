//! Task types: the keys under which agent capabilities are registered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a capability / pipeline step kind (e.g. `verify`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskType(pub String);

impl TaskType {
    pub const VERIFY: &'static str = "verify";
    pub const FRAUD_CHECK: &'static str = "fraud_check";
    pub const CONFIDENCE_SCORE: &'static str = "confidence_score";
    pub const RECORD_PROVENANCE: &'static str = "record_provenance";
    pub const COMPLIANCE_CHECK: &'static str = "compliance_check";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn verify() -> Self {
        Self::new(Self::VERIFY)
    }

    pub fn fraud_check() -> Self {
        Self::new(Self::FRAUD_CHECK)
    }

    pub fn confidence_score() -> Self {
        Self::new(Self::CONFIDENCE_SCORE)
    }

    pub fn record_provenance() -> Self {
        Self::new(Self::RECORD_PROVENANCE)
    }

    pub fn compliance_check() -> Self {
        Self::new(Self::COMPLIANCE_CHECK)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for TaskType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TaskType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
