//! Fraud Check Agent - weighted heuristics over the provider record

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AgentFailure;
use crate::registry::Agent;
use crate::task::Task;
use crate::verification::verified_count;

const INCONSISTENCY_WEIGHT: f64 = 0.20;
const FAKE_PATTERN_WEIGHT: f64 = 0.25;
const REGISTRATION_WEIGHT: f64 = 0.10;

const PLACEHOLDER_NAMES: [&str; 4] = ["test", "demo", "fake", "sample"];
const SEQUENTIAL_NUMBERS: [&str; 2] = ["123456", "ABCDEF"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            RiskLevel::Critical
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone)]
pub struct FraudCheckAgent {
    fraud_threshold: f64,
}

impl FraudCheckAgent {
    pub fn new(fraud_threshold: f64) -> Self {
        Self { fraud_threshold }
    }

    fn inconsistencies(task: &Task) -> Vec<String> {
        let mut found = Vec::new();

        if let Some(name) = task.field_str("name") {
            if name.chars().count() < 3 {
                found.push("Name too short".to_string());
            }
        }
        if let Some(reg) = task.field_str("registration_number") {
            if !reg.chars().all(char::is_alphanumeric) {
                found.push("Invalid registration number format".to_string());
            }
        }
        if let Some(phone) = task.field_str("phone") {
            let digits: String = phone.chars().filter(|c| *c != '+' && *c != '-').collect();
            if phone.len() < 10 || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                found.push("Invalid phone number format".to_string());
            }
        }
        if let Some(email) = task.field_str("email") {
            if !email.contains('@') {
                found.push("Invalid email format".to_string());
            }
        }
        if let Some(results) = task
            .upstream("verify")
            .and_then(|v| v.get("verification_results"))
            .and_then(Value::as_object)
        {
            if !results.is_empty() && verified_count(results) == 0 {
                found.push("No sources verified".to_string());
            }
        }

        found
    }

    fn fake_patterns(task: &Task) -> Vec<String> {
        let mut found = Vec::new();

        if let Some(reg) = task.field_str("registration_number") {
            if SEQUENTIAL_NUMBERS.contains(&reg) {
                found.push("Sequential registration number".to_string());
            }
        }
        if let Some(name) = task.field_str("name") {
            let lower = name.to_lowercase();
            if PLACEHOLDER_NAMES.iter().any(|p| lower.contains(p)) {
                found.push("Generic/placeholder name".to_string());
            }
        }
        let missing: Vec<&str> = ["registration_number", "name", "provider_type"]
            .into_iter()
            .filter(|f| !task.has_field(f))
            .collect();
        if missing.len() > 1 {
            found.push(format!("Missing critical fields: {}", missing.join(", ")));
        }

        found
    }

    fn registration_issues(task: &Task) -> Vec<String> {
        match task.field_str("registration_number") {
            None => vec!["Registration number missing".to_string()],
            Some(reg) if reg.chars().count() < 6 => vec!["Registration number too short".to_string()],
            Some(reg) if !reg.chars().all(char::is_alphanumeric) => {
                vec!["Registration number contains invalid characters".to_string()]
            }
            Some(_) => vec![],
        }
    }
}

#[async_trait]
impl Agent for FraudCheckAgent {
    async fn process(&self, task: &Task) -> Result<Value, AgentFailure> {
        let inconsistencies = Self::inconsistencies(task);
        let fake_patterns = Self::fake_patterns(task);
        let registration = Self::registration_issues(task);

        let inconsistency_score = (inconsistencies.len() as f64 / 5.0).min(1.0);
        let fake_score = (fake_patterns.len() as f64 / 3.0).min(1.0);
        let registration_invalid = if registration.is_empty() { 0.0 } else { 1.0 };

        let fraud_score = (inconsistency_score * INCONSISTENCY_WEIGHT
            + fake_score * FAKE_PATTERN_WEIGHT
            + registration_invalid * REGISTRATION_WEIGHT)
            .min(1.0);
        let risk_level = RiskLevel::from_score(fraud_score);

        Ok(json!({
            "fraud_score": fraud_score,
            "risk_level": risk_level,
            "is_fraudulent": fraud_score > self.fraud_threshold,
            "checks": {
                "inconsistency_check": { "score": inconsistency_score, "inconsistencies": inconsistencies },
                "fake_pattern_check": { "score": fake_score, "indicators": fake_patterns },
                "registration_validity": { "is_valid": registration.is_empty(), "issues": registration },
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::fixtures;

    #[test]
    fn test_risk_levels() {
        assert_eq!(RiskLevel::from_score(0.85), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.45), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.1), RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_clean_provider_scores_zero() {
        let out = FraudCheckAgent::new(0.8)
            .process(&fixtures::task("fraud_check", fixtures::provider()))
            .await
            .unwrap();
        assert_eq!(out["fraud_score"], 0.0);
        assert_eq!(out["risk_level"], "low");
        assert_eq!(out["is_fraudulent"], false);
    }

    #[tokio::test]
    async fn test_placeholder_provider_is_flagged() {
        let payload = json!({
            "registration_number": "123456",
            "name": "Test Clinic",
            "email": "nobody",
        });
        let out = FraudCheckAgent::new(0.8)
            .process(&fixtures::task("fraud_check", payload))
            .await
            .unwrap();
        let score = out["fraud_score"].as_f64().unwrap();
        // 1/5 * 0.20 + 2/3 * 0.25
        assert!((score - (0.04 + 2.0 / 3.0 * 0.25)).abs() < 1e-9);
        let indicators = out["checks"]["fake_pattern_check"]["indicators"].as_array().unwrap();
        assert_eq!(indicators.len(), 2);
    }
}
