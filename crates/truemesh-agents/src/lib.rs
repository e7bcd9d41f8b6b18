//! TrueMesh Agents - Capability registry and the agent contract
//!
//! The workflow engine never talks to an agent directly. It resolves a
//! [`TaskType`] through the [`CapabilityRegistry`] and invokes the returned
//! [`AgentHandle`], which tracks in-flight executions and recent durations for
//! status reporting.
//!
//! Reference agents for the provider-verification pipeline live here too:
//!
//! - **VerificationAgent**: registry lookups against the registration number
//! - **FraudCheckAgent**: inconsistency, fake-pattern and registration checks
//! - **ConfidenceScoringAgent**: completeness plus upstream verification confidence
//! - **ProvenanceAgent**: digest of the upstream step results
//! - **ComplianceAgent**: completeness and threshold policies
//!
//! Registration happens once at startup on an owned registry; afterwards the
//! registry is shared read-only behind an `Arc`.

pub mod compliance;
pub mod confidence;
pub mod error;
pub mod fraud;
pub mod provenance;
pub mod registry;
pub mod task;
pub mod verification;

pub use compliance::ComplianceAgent;
pub use confidence::ConfidenceScoringAgent;
pub use error::{AgentFailure, RegistryError, Result};
pub use fraud::{FraudCheckAgent, RiskLevel};
pub use provenance::ProvenanceAgent;
pub use registry::{Agent, AgentHandle, CapabilityRegistry, CapabilityStatus, RegistryConfig};
pub use task::Task;
pub use verification::VerificationAgent;

pub use truemesh_types::TaskType;

use serde::{Deserialize, Serialize};

/// Decision thresholds used by the reference agents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentThresholds {
    /// Fraud score above which a provider is flagged as fraudulent
    pub fraud_threshold: f64,
    /// Maximum fraud score tolerated by the compliance policy
    pub max_fraud_score: f64,
    /// Minimum overall confidence required by the compliance policy
    pub min_confidence_score: f64,
    /// Minimum data consistency required by the compliance policy
    pub min_consistency_score: f64,
}

impl Default for AgentThresholds {
    fn default() -> Self {
        Self {
            fraud_threshold: 0.8,
            max_fraud_score: 0.5,
            min_confidence_score: 0.7,
            min_consistency_score: 0.8,
        }
    }
}

/// Register the five reference agents under their pipeline task types
pub fn register_reference_agents(
    registry: &mut CapabilityRegistry,
    thresholds: &AgentThresholds,
) -> Result<()> {
    let fraud_threshold = thresholds.fraud_threshold;
    let compliance = thresholds.clone();

    registry.register(TaskType::verify(), VerificationAgent::new)?;
    registry.register(TaskType::fraud_check(), move || FraudCheckAgent::new(fraud_threshold))?;
    registry.register(TaskType::confidence_score(), ConfidenceScoringAgent::new)?;
    registry.register(TaskType::record_provenance(), ProvenanceAgent::new)?;
    registry.register(TaskType::compliance_check(), move || ComplianceAgent::new(compliance))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_agents_cover_pipeline() {
        let mut registry = CapabilityRegistry::new(RegistryConfig::default());
        register_reference_agents(&mut registry, &AgentThresholds::default()).unwrap();

        for step in [
            TaskType::VERIFY,
            TaskType::FRAUD_CHECK,
            TaskType::CONFIDENCE_SCORE,
            TaskType::RECORD_PROVENANCE,
            TaskType::COMPLIANCE_CHECK,
        ] {
            assert!(registry.resolve(&TaskType::new(step)).is_ok(), "{step} missing");
        }
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_registering_twice_fails() {
        let mut registry = CapabilityRegistry::new(RegistryConfig::default());
        register_reference_agents(&mut registry, &AgentThresholds::default()).unwrap();
        let result = register_reference_agents(&mut registry, &AgentThresholds::default());
        assert!(matches!(result, Err(RegistryError::DuplicateCapability { .. })));
    }
}
