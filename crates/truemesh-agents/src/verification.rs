//! Verification Agent - checks the registration number against registries
//!
//! Registry lookups are simulated from the registration number format: a
//! source confirms a number of at least six characters, and the medical
//! council additionally requires it to be alphanumeric.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::error::AgentFailure;
use crate::registry::Agent;
use crate::task::Task;

/// One external registry consulted during verification
struct Source {
    name: &'static str,
    confidence: f64,
    alphanumeric_only: bool,
}

const SOURCES: [Source; 3] = [
    Source {
        name: "mci_registry",
        confidence: 0.9,
        alphanumeric_only: true,
    },
    Source {
        name: "insurance_registry",
        confidence: 0.85,
        alphanumeric_only: false,
    },
    Source {
        name: "government_database",
        confidence: 0.8,
        alphanumeric_only: false,
    },
];

const MIN_REGISTRATION_LEN: usize = 6;

#[derive(Debug, Default, Clone)]
pub struct VerificationAgent;

impl VerificationAgent {
    pub fn new() -> Self {
        Self
    }

    fn lookup(source: &Source, registration_number: &str) -> Value {
        let long_enough = registration_number.chars().count() >= MIN_REGISTRATION_LEN;
        let valid = long_enough
            && (!source.alphanumeric_only || registration_number.chars().all(char::is_alphanumeric));

        json!({
            "status": if valid { "verified" } else { "not_found" },
            "source": source.name,
            "confidence": if valid { source.confidence } else { 0.0 },
        })
    }
}

/// Verified when at least two sources confirm, or the only source does
pub(crate) fn is_verified(results: &Map<String, Value>) -> bool {
    let verified = verified_count(results);
    if results.len() >= 2 {
        verified >= 2
    } else {
        verified >= 1
    }
}

pub(crate) fn verified_count(results: &Map<String, Value>) -> usize {
    results
        .values()
        .filter(|r| r.get("status").and_then(Value::as_str) == Some("verified"))
        .count()
}

pub(crate) fn mean_confidence(results: &Map<String, Value>) -> f64 {
    let confidences: Vec<f64> = results
        .values()
        .filter_map(|r| r.get("confidence").and_then(Value::as_f64))
        .collect();
    if confidences.is_empty() {
        return 0.0;
    }
    confidences.iter().sum::<f64>() / confidences.len() as f64
}

#[async_trait]
impl Agent for VerificationAgent {
    async fn process(&self, task: &Task) -> Result<Value, AgentFailure> {
        let registration_number = task
            .field_str("registration_number")
            .ok_or_else(|| AgentFailure::fatal("registration_number is required"))?;

        let mut results = Map::new();
        for source in &SOURCES {
            results.insert(source.name.to_string(), Self::lookup(source, registration_number));
        }

        let verified = is_verified(&results);
        let confidence = mean_confidence(&results);
        tracing::debug!(
            subject_id = %task.subject_id,
            verified,
            confidence,
            "Verification finished"
        );

        Ok(json!({
            "is_verified": verified,
            "confidence_score": confidence,
            "verification_results": results,
            "verified_at": Utc::now().to_rfc3339(),
        }))
    }
}
