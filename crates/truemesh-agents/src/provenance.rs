//! Provenance Agent - seals the upstream step results into one digest

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use truemesh_crypto::canonical_hash;

use crate::error::AgentFailure;
use crate::registry::Agent;
use crate::task::Task;

#[derive(Debug, Default, Clone)]
pub struct ProvenanceAgent;

impl ProvenanceAgent {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Agent for ProvenanceAgent {
    async fn process(&self, task: &Task) -> Result<Value, AgentFailure> {
        if task.upstream.is_empty() {
            return Err(AgentFailure::fatal("no upstream results to record"));
        }

        let digest = canonical_hash(&json!({
            "subject_id": task.subject_id,
            "results": task.upstream,
        }))
        .map_err(|e| AgentFailure::fatal(e.to_string()))?;

        let steps: Vec<&str> = task.upstream.keys().map(|k| k.as_str()).collect();
        Ok(json!({
            "provenance_digest": digest,
            "steps": steps,
            "recorded_at": Utc::now().to_rfc3339(),
        }))
    }
}
