//! One dispatched pipeline step

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use truemesh_types::{SubjectId, TaskId, TaskType, WorkflowId};

/// A pipeline step instance handed to an agent.
///
/// The task id is stable across retries; `attempt` starts at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub workflow_id: WorkflowId,
    pub subject_id: SubjectId,
    pub task_type: TaskType,
    /// The workflow input payload
    pub payload: Value,
    /// Success payloads of every upstream step, keyed by step
    pub upstream: BTreeMap<TaskType, Value>,
    /// Task ids of the direct dependencies
    pub dependencies: Vec<TaskId>,
    pub attempt: u32,
    /// Deadline of the current attempt
    pub deadline: DateTime<Utc>,
}

impl Task {
    /// Result of an upstream step, if it ran
    pub fn upstream(&self, step: &str) -> Option<&Value> {
        self.upstream.get(&TaskType::new(step))
    }

    /// String field of the workflow payload; empty strings count as absent
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// True when the payload field is present and truthy
    pub fn has_field(&self, key: &str) -> bool {
        match self.payload.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Bool(b)) => *b,
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(Value::Number(_)) => true,
        }
    }
}
