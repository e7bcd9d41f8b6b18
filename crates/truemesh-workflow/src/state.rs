//! Workflow state machine and per-step records

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use truemesh_types::{SubjectId, TaskId, TaskType, TransactionId, WorkflowId};

use crate::error::{Result, TaskError, WorkflowError};
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Pending,
    Dispatching,
    AwaitingAgents,
    Aggregating,
    Completed,
    CompletedWithWarnings,
    Failed,
    TimedOut,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Completed
                | WorkflowState::CompletedWithWarnings
                | WorkflowState::Failed
                | WorkflowState::TimedOut
        )
    }

    /// States only move forward; terminal states never change
    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        match self {
            Pending => matches!(next, Dispatching | Failed | TimedOut),
            Dispatching => matches!(next, AwaitingAgents | Aggregating | Failed | TimedOut),
            AwaitingAgents => matches!(next, Aggregating | Failed | TimedOut),
            Aggregating => matches!(next, Completed | CompletedWithWarnings | Failed | TimedOut),
            Completed | CompletedWithWarnings | Failed | TimedOut => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn is_settled(self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Failed | StepStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success(Value),
    Failure(TaskError),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            TaskOutcome::Success(v) => Some(v),
            TaskOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&TaskError> {
        match self {
            TaskOutcome::Success(_) => None,
            TaskOutcome::Failure(e) => Some(e),
        }
    }
}

/// Immutable result of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub outcome: TaskOutcome,
    pub attempts: u32,
    pub duration: Duration,
    pub completed_at: DateTime<Utc>,
    /// Ledger transaction recorded for this step, if any
    pub transaction_id: Option<TransactionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub task_type: TaskType,
    pub task_id: TaskId,
    pub status: StepStatus,
    pub optional: bool,
    pub result: Option<TaskResult>,
}

/// Everything the engine knows about one workflow; the unit of persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub workflow_id: WorkflowId,
    pub subject_id: SubjectId,
    pub pipeline: String,
    pub payload: Value,
    pub state: WorkflowState,
    pub steps: Vec<StepRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRecord {
    pub fn new(subject_id: SubjectId, payload: Value, pipeline: &Pipeline) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: WorkflowId::new(),
            subject_id,
            pipeline: pipeline.name().to_string(),
            payload,
            state: WorkflowState::Pending,
            steps: pipeline
                .steps()
                .iter()
                .map(|s| StepRecord {
                    task_type: s.name.clone(),
                    task_id: TaskId::new(),
                    status: StepStatus::Pending,
                    optional: s.optional,
                    result: None,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: WorkflowState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(WorkflowError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn step(&self, task_type: &TaskType) -> Option<&StepRecord> {
        self.steps.iter().find(|s| &s.task_type == task_type)
    }

    pub fn step_mut(&mut self, task_type: &TaskType) -> Option<&mut StepRecord> {
        self.steps.iter_mut().find(|s| &s.task_type == task_type)
    }

    /// Terminal state implied by the step results
    pub fn outcome(&self) -> WorkflowState {
        let unsuccessful = |s: &StepRecord| s.status != StepStatus::Succeeded;
        if self.steps.iter().any(|s| !s.optional && unsuccessful(s)) {
            WorkflowState::Failed
        } else if self.steps.iter().any(unsuccessful) {
            WorkflowState::CompletedWithWarnings
        } else {
            WorkflowState::Completed
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        WorkflowStatus {
            workflow_id: self.workflow_id,
            subject_id: self.subject_id.clone(),
            pipeline: self.pipeline.clone(),
            state: self.state,
            steps: self.steps.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// What callers see: state plus per-step outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub workflow_id: WorkflowId,
    pub subject_id: SubjectId,
    pub pipeline: String,
    pub state: WorkflowState,
    pub steps: Vec<StepRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowStatus {
    pub fn step(&self, task_type: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.task_type == task_type)
    }

    /// Ledger transactions recorded by this workflow, in step order
    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        self.steps
            .iter()
            .filter_map(|s| s.result.as_ref().and_then(|r| r.transaction_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_happy_path_transitions() {
        let mut record = WorkflowRecord::new(
            SubjectId::new("P1"),
            json!({}),
            &Pipeline::provider_registration(),
        );
        for next in [
            WorkflowState::Dispatching,
            WorkflowState::AwaitingAgents,
            WorkflowState::Aggregating,
            WorkflowState::Completed,
        ] {
            record.transition(next).unwrap();
        }
        assert!(record.state.is_terminal());
    }

    #[test]
    fn test_illegal_transitions() {
        use WorkflowState::*;
        assert!(!Pending.can_transition_to(Completed));
        assert!(!AwaitingAgents.can_transition_to(Dispatching));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!TimedOut.can_transition_to(Pending));
        assert!(Dispatching.can_transition_to(TimedOut));

        let mut record = WorkflowRecord::new(
            SubjectId::new("P1"),
            json!({}),
            &Pipeline::provider_registration(),
        );
        assert!(matches!(
            record.transition(Aggregating),
            Err(WorkflowError::IllegalTransition { from: Pending, to: Aggregating })
        ));
    }

    #[test]
    fn test_outcome_respects_optional_steps() {
        let mut record = WorkflowRecord::new(
            SubjectId::new("P1"),
            json!({}),
            &Pipeline::provider_registration(),
        );
        for step in &mut record.steps {
            step.status = StepStatus::Succeeded;
        }
        assert_eq!(record.outcome(), WorkflowState::Completed);

        record.step_mut(&TaskType::compliance_check()).unwrap().status = StepStatus::Failed;
        assert_eq!(record.outcome(), WorkflowState::CompletedWithWarnings);

        record.step_mut(&TaskType::verify()).unwrap().status = StepStatus::Failed;
        assert_eq!(record.outcome(), WorkflowState::Failed);
    }

    #[test]
    fn test_state_serde_names() {
        assert_eq!(
            serde_json::to_value(WorkflowState::CompletedWithWarnings).unwrap(),
            json!("COMPLETED_WITH_WARNINGS")
        );
    }
}
