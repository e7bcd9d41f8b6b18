//! Compliance Agent - data policy checks over the provider record and the
//! upstream scores

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::AgentFailure;
use crate::registry::Agent;
use crate::task::Task;
use crate::AgentThresholds;

const REQUIRED_FIELDS: [&str; 5] = ["registration_number", "name", "provider_type", "city", "state"];

#[derive(Debug, Clone)]
pub struct ComplianceAgent {
    thresholds: AgentThresholds,
}

impl ComplianceAgent {
    pub fn new(thresholds: AgentThresholds) -> Self {
        Self { thresholds }
    }

    fn upstream_f64(task: &Task, step: &str, pointer: &str) -> Option<f64> {
        task.upstream(step)
            .and_then(|v| v.pointer(pointer))
            .and_then(Value::as_f64)
    }
}

#[async_trait]
impl Agent for ComplianceAgent {
    async fn process(&self, task: &Task) -> Result<Value, AgentFailure> {
        let mut violations = Vec::new();
        let mut checks = Vec::new();

        let missing: Vec<&str> = REQUIRED_FIELDS
            .into_iter()
            .filter(|f| !task.has_field(f))
            .collect();
        checks.push("data_completeness");
        if !missing.is_empty() {
            violations.push(json!({
                "policy": "data_completeness",
                "severity": "high",
                "description": format!("Missing required fields: {}", missing.join(", ")),
                "auto_resolvable": false,
            }));
        }

        if let Some(consistency) =
            Self::upstream_f64(task, "confidence_score", "/confidence_scores/consistency_score")
        {
            checks.push("data_accuracy");
            if consistency < self.thresholds.min_consistency_score {
                violations.push(json!({
                    "policy": "data_accuracy",
                    "severity": "medium",
                    "description": format!(
                        "Data consistency score {consistency} below required {}",
                        self.thresholds.min_consistency_score
                    ),
                    "auto_resolvable": false,
                }));
            }
        }

        if let Some(fraud_score) = Self::upstream_f64(task, "fraud_check", "/fraud_score") {
            checks.push("fraud_risk_threshold");
            if fraud_score > self.thresholds.max_fraud_score {
                violations.push(json!({
                    "policy": "fraud_risk_threshold",
                    "severity": "critical",
                    "description": format!(
                        "Fraud score {fraud_score} exceeds threshold {}",
                        self.thresholds.max_fraud_score
                    ),
                    "auto_resolvable": true,
                    "resolution_action": "flag_for_review",
                }));
            }
        }

        if let Some(overall) = Self::upstream_f64(task, "confidence_score", "/overall_score") {
            checks.push("confidence_threshold");
            if overall < self.thresholds.min_confidence_score {
                violations.push(json!({
                    "policy": "confidence_threshold",
                    "severity": "medium",
                    "description": format!(
                        "Confidence score {overall} below minimum {}",
                        self.thresholds.min_confidence_score
                    ),
                    "auto_resolvable": false,
                }));
            }
        }

        let compliant = violations.is_empty();
        if !compliant {
            tracing::info!(
                subject_id = %task.subject_id,
                violations = violations.len(),
                "Compliance violations found"
            );
        }

        Ok(json!({
            "compliance_status": if compliant { "compliant" } else { "non_compliant" },
            "is_compliant": compliant,
            "violations": violations,
            "checks_performed": checks,
            "checked_at": Utc::now().to_rfc3339(),
        }))
    }
}
