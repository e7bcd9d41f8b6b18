//! Pipeline templates: steps and dependency edges as data

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use truemesh_types::TaskType;

use crate::error::{Result, WorkflowError};
use crate::policy::RetryPolicy;

pub const PROVIDER_REGISTRATION: &str = "provider_registration";
pub const PROVIDER_VERIFICATION: &str = "provider_verification";
pub const FRAUD_INVESTIGATION: &str = "fraud_investigation";
/// Pipeline name; the step of the same name is `TaskType::COMPLIANCE_CHECK`
pub const COMPLIANCE_REVIEW: &str = "compliance_check";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: TaskType,
    pub depends_on: Vec<TaskType>,
    /// A failure downgrades the workflow instead of failing it
    pub optional: bool,
    /// Successful results are recorded on the provenance ledger
    pub ledger_worthy: bool,
    /// Overrides the engine's default retry policy
    pub retry: Option<RetryPolicy>,
}

impl Step {
    pub fn new(name: impl Into<TaskType>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            optional: false,
            ledger_worthy: true,
            retry: None,
        }
    }

    pub fn after<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskType>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn ledger_worthy(mut self, ledger_worthy: bool) -> Self {
        self.ledger_worthy = ledger_worthy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// A validated DAG of steps. Steps are kept in topological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    name: String,
    steps: Vec<Step>,
}

impl Pipeline {
    /// Validate and topologically order `steps`: names are unique, every
    /// dependency exists and there is no cycle.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Result<Self> {
        let name = name.into();
        if steps.is_empty() {
            return Err(WorkflowError::invalid_pipeline(format!("{name} has no steps")));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(&step.name) {
                return Err(WorkflowError::invalid_pipeline(format!(
                    "duplicate step {}",
                    step.name
                )));
            }
        }
        for step in &steps {
            for dep in &step.depends_on {
                if !seen.contains(dep) {
                    return Err(WorkflowError::invalid_pipeline(format!(
                        "{} depends on unknown step {dep}",
                        step.name
                    )));
                }
                if dep == &step.name {
                    return Err(WorkflowError::invalid_pipeline(format!(
                        "{} depends on itself",
                        step.name
                    )));
                }
            }
        }

        // Kahn's algorithm, stable with respect to declaration order
        let mut remaining: HashMap<&TaskType, usize> = steps
            .iter()
            .map(|s| (&s.name, s.depends_on.iter().collect::<HashSet<_>>().len()))
            .collect();
        let mut ordered: Vec<Step> = Vec::with_capacity(steps.len());
        let mut placed: HashSet<TaskType> = HashSet::new();
        while ordered.len() < steps.len() {
            let next = steps
                .iter()
                .find(|s| !placed.contains(&s.name) && remaining[&s.name] == 0);
            let Some(step) = next else {
                return Err(WorkflowError::invalid_pipeline(format!(
                    "{name} contains a dependency cycle"
                )));
            };
            placed.insert(step.name.clone());
            for other in &steps {
                if other.depends_on.iter().collect::<HashSet<_>>().contains(&step.name) {
                    if let Some(count) = remaining.get_mut(&other.name) {
                        *count -= 1;
                    }
                }
            }
            ordered.push(step.clone());
        }

        Ok(Self {
            name,
            steps: ordered,
        })
    }

    /// `verify → {fraud_check, confidence_score} → record_provenance → compliance_check`
    pub fn provider_registration() -> Self {
        Self {
            name: PROVIDER_REGISTRATION.to_string(),
            steps: vec![
                Step::new(TaskType::verify()),
                Step::new(TaskType::fraud_check()).after([TaskType::VERIFY]),
                Step::new(TaskType::confidence_score()).after([TaskType::VERIFY]),
                Step::new(TaskType::record_provenance())
                    .after([
                        TaskType::VERIFY,
                        TaskType::FRAUD_CHECK,
                        TaskType::CONFIDENCE_SCORE,
                    ])
                    .ledger_worthy(false),
                Step::new(TaskType::compliance_check())
                    .after([TaskType::RECORD_PROVENANCE])
                    .optional(true),
            ],
        }
    }

    /// `verify → confidence_score → record_provenance`
    pub fn provider_verification() -> Self {
        Self {
            name: PROVIDER_VERIFICATION.to_string(),
            steps: vec![
                Step::new(TaskType::verify()),
                Step::new(TaskType::confidence_score()).after([TaskType::VERIFY]),
                Step::new(TaskType::record_provenance())
                    .after([TaskType::VERIFY, TaskType::CONFIDENCE_SCORE])
                    .ledger_worthy(false),
            ],
        }
    }

    /// `fraud_check → verify → compliance_check`
    pub fn fraud_investigation() -> Self {
        Self {
            name: FRAUD_INVESTIGATION.to_string(),
            steps: vec![
                Step::new(TaskType::fraud_check()),
                Step::new(TaskType::verify()).after([TaskType::FRAUD_CHECK]),
                Step::new(TaskType::compliance_check()).after([TaskType::VERIFY]),
            ],
        }
    }

    /// `compliance_check → verify`
    pub fn compliance_review() -> Self {
        Self {
            name: COMPLIANCE_REVIEW.to_string(),
            steps: vec![
                Step::new(TaskType::compliance_check()),
                Step::new(TaskType::verify()).after([TaskType::COMPLIANCE_CHECK]),
            ],
        }
    }

    /// Every pipeline the engine registers on construction
    pub fn builtin() -> [Self; 4] {
        [
            Self::provider_registration(),
            Self::provider_verification(),
            Self::fraud_investigation(),
            Self::compliance_review(),
        ]
    }

    /// Mark exactly the listed steps optional
    pub fn with_optional(mut self, optional: &[TaskType]) -> Self {
        for step in &mut self.steps {
            step.optional = optional.contains(&step.name);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, name: &TaskType) -> Option<&Step> {
        self.steps.iter().find(|s| &s.name == name)
    }

    /// Every transitive dependency of `name`
    pub fn ancestors(&self, name: &TaskType) -> BTreeSet<TaskType> {
        let mut out = BTreeSet::new();
        let mut stack: Vec<&TaskType> = self
            .step(name)
            .map(|s| s.depends_on.iter().collect())
            .unwrap_or_default();
        while let Some(dep) = stack.pop() {
            if out.insert(dep.clone()) {
                if let Some(step) = self.step(dep) {
                    stack.extend(step.depends_on.iter());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(p: &Pipeline) -> Vec<&str> {
        p.steps().iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_builtin_templates_validate() {
        for template in Pipeline::builtin() {
            let revalidated = Pipeline::new(template.name(), template.steps().to_vec()).unwrap();
            assert_eq!(revalidated, template);
        }
    }

    #[test]
    fn test_registration_shape() {
        let p = Pipeline::provider_registration();
        assert_eq!(
            names(&p),
            vec!["verify", "fraud_check", "confidence_score", "record_provenance", "compliance_check"]
        );
        let compliance = p.step(&TaskType::compliance_check()).unwrap();
        assert!(compliance.optional);
        assert!(!p.step(&TaskType::record_provenance()).unwrap().ledger_worthy);
        assert_eq!(p.ancestors(&TaskType::compliance_check()).len(), 4);
    }

    #[test]
    fn test_investigation_and_review_shapes() {
        let fraud = Pipeline::fraud_investigation();
        assert_eq!(fraud.name(), FRAUD_INVESTIGATION);
        assert_eq!(names(&fraud), vec!["fraud_check", "verify", "compliance_check"]);
        assert_eq!(
            fraud.ancestors(&TaskType::compliance_check()),
            BTreeSet::from([TaskType::fraud_check(), TaskType::verify()])
        );
        assert!(fraud.steps().iter().all(|s| s.ledger_worthy));

        let review = Pipeline::compliance_review();
        assert_eq!(review.name(), "compliance_check");
        assert_eq!(names(&review), vec!["compliance_check", "verify"]);
        assert_eq!(
            review.step(&TaskType::verify()).unwrap().depends_on,
            vec![TaskType::compliance_check()]
        );
    }

    #[test]
    fn test_steps_are_reordered_topologically() {
        let p = Pipeline::new(
            "reversed",
            vec![
                Step::new("c").after(["b"]),
                Step::new("b").after(["a"]),
                Step::new("a"),
            ],
        )
        .unwrap();
        assert_eq!(names(&p), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rejects_bad_graphs() {
        let dup = Pipeline::new("dup", vec![Step::new("a"), Step::new("a")]);
        assert!(matches!(dup, Err(WorkflowError::InvalidPipeline { .. })));

        let missing = Pipeline::new("missing", vec![Step::new("a").after(["ghost"])]);
        assert!(matches!(missing, Err(WorkflowError::InvalidPipeline { .. })));

        let cycle = Pipeline::new(
            "cycle",
            vec![Step::new("a").after(["b"]), Step::new("b").after(["a"])],
        );
        assert!(matches!(cycle, Err(WorkflowError::InvalidPipeline { .. })));

        let empty = Pipeline::new("empty", vec![]);
        assert!(matches!(empty, Err(WorkflowError::InvalidPipeline { .. })));
    }

    #[test]
    fn test_with_optional_replaces_flags() {
        let p = Pipeline::provider_registration().with_optional(&[TaskType::fraud_check()]);
        assert!(p.step(&TaskType::fraud_check()).unwrap().optional);
        assert!(!p.step(&TaskType::compliance_check()).unwrap().optional);
    }
}
