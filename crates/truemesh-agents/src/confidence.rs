//! Confidence Scoring Agent

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::AgentFailure;
use crate::registry::Agent;
use crate::task::Task;
use crate::verification::{mean_confidence, verified_count};

const REQUIRED_FIELDS: [&str; 3] = ["registration_number", "name", "provider_type"];
const OPTIONAL_FIELDS: [&str; 4] = ["email", "phone", "city", "state"];
const DEFAULT_HISTORICAL_SCORE: f64 = 0.5;

#[derive(Debug, Default, Clone)]
pub struct ConfidenceScoringAgent;

impl ConfidenceScoringAgent {
    pub fn new() -> Self {
        Self
    }

    /// Completeness of the record, required fields weighted 0.7
    fn consistency(task: &Task) -> f64 {
        let share = |fields: &[&str]| {
            fields.iter().filter(|f| task.has_field(f)).count() as f64 / fields.len() as f64
        };
        share(&REQUIRED_FIELDS) * 0.7 + share(&OPTIONAL_FIELDS) * 0.3
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[async_trait]
impl Agent for ConfidenceScoringAgent {
    async fn process(&self, task: &Task) -> Result<Value, AgentFailure> {
        let empty = Map::new();
        let results = task
            .upstream("verify")
            .and_then(|v| v.get("verification_results"))
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let verified = verified_count(results);
        let diversity = verified as f64 / results.len().max(1) as f64;
        let verification = mean_confidence(results);
        let consistency = Self::consistency(task);
        let historical = task
            .payload
            .get("historical_score")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_HISTORICAL_SCORE);
        let external = verified as f64 / 5.0;

        let overall = (diversity * 0.30
            + verification * 0.25
            + consistency * 0.20
            + historical * 0.15
            + external * 0.10)
            .clamp(0.0, 1.0);

        Ok(json!({
            "overall_score": round3(overall),
            "confidence_scores": {
                "overall_score": round3(overall),
                "verification_score": round3(verification),
                "consistency_score": round3(consistency),
                "historical_score": round3(historical),
                "external_score": round3(external),
            },
        }))
    }
}
