//! Identity types for TrueMesh
//!
//! Generated identities are strongly typed wrappers around UUIDs so that a
//! workflow id can never be passed where a transaction id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id_type!(WorkflowId, "wf", "Unique identifier for one run of a pipeline");
define_id_type!(TaskId, "task", "Unique identifier for one pipeline step instance");
define_id_type!(TransactionId, "tx", "Unique identifier for a ledger transaction");

/// Identifier of the subject a workflow is about (a provider id).
///
/// Supplied by callers, so it is an opaque string rather than a UUID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Subject used for records the system writes about itself (genesis).
    pub fn system() -> Self {
        Self("system".to_string())
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_display_and_parse() {
        let id = TransactionId::new();
        let rendered = id.to_string();
        assert!(rendered.starts_with("tx_"));
        assert_eq!(TransactionId::parse(&rendered).unwrap(), id);
        assert_eq!(TransactionId::parse(&id.0.to_string()).unwrap(), id);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(WorkflowId::new(), WorkflowId::new());
    }

    #[test]
    fn test_subject_id_serializes_as_plain_string() {
        let subject = SubjectId::from("P1");
        assert_eq!(serde_json::to_string(&subject).unwrap(), "\"P1\"");
    }
}
