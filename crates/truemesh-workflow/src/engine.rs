//! The workflow engine: a generic DAG scheduler over the capability registry

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::Instrument;
use truemesh_agents::{CapabilityRegistry, CapabilityStatus, Task};
use truemesh_ledger::{LedgerError, ProvenanceLedger};
use truemesh_types::{SubjectId, TaskType, TransactionId, WorkflowId};

use crate::error::{Result, TaskError, WorkflowError};
use crate::pipeline::{Pipeline, Step, PROVIDER_REGISTRATION};
use crate::policy::RetryPolicy;
use crate::state::{StepStatus, TaskOutcome, TaskResult, WorkflowRecord, WorkflowState, WorkflowStatus};
use crate::store::WorkflowStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Policy for steps that do not carry their own
    pub retry: RetryPolicy,
    /// Bound on a whole workflow, from dispatch to aggregation
    pub workflow_timeout_ms: u64,
    /// Steps of the built-in pipelines whose failure only raises a warning
    pub optional_steps: Vec<TaskType>,
    /// Pipeline used by [`WorkflowEngine::submit`]
    pub default_pipeline: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            workflow_timeout_ms: 900_000,
            optional_steps: vec![TaskType::compliance_check()],
            default_pipeline: PROVIDER_REGISTRATION.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn workflow_timeout(&self) -> Duration {
        Duration::from_millis(self.workflow_timeout_ms)
    }
}

/// A workflow that has not reached a terminal state yet
struct LiveWorkflow {
    record: Mutex<WorkflowRecord>,
    done: watch::Sender<bool>,
}

/// Everything a spawned step needs; owned so the step can outlive the borrow
struct StepContext {
    registry: Arc<CapabilityRegistry>,
    ledger: Arc<ProvenanceLedger>,
    step: Step,
    policy: RetryPolicy,
    task: Task,
}

struct StepCompletion {
    task_type: TaskType,
    result: TaskResult,
}

/// Runs pipelines for subjects.
///
/// Cheap to clone. Each submitted workflow runs on its own task; the
/// registry and ledger are shared by all of them.
#[derive(Clone)]
pub struct WorkflowEngine {
    registry: Arc<CapabilityRegistry>,
    ledger: Arc<ProvenanceLedger>,
    store: Arc<dyn WorkflowStore>,
    config: Arc<EngineConfig>,
    pipelines: Arc<HashMap<String, Arc<Pipeline>>>,
    live: Arc<DashMap<WorkflowId, Arc<LiveWorkflow>>>,
}

impl WorkflowEngine {
    /// Engine with the built-in pipelines registered under their names
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        ledger: Arc<ProvenanceLedger>,
        store: Arc<dyn WorkflowStore>,
        config: EngineConfig,
    ) -> Self {
        let mut pipelines = HashMap::new();
        for pipeline in Pipeline::builtin() {
            let pipeline = pipeline.with_optional(&config.optional_steps);
            pipelines.insert(pipeline.name().to_string(), Arc::new(pipeline));
        }

        Self {
            registry,
            ledger,
            store,
            config: Arc::new(config),
            pipelines: Arc::new(pipelines),
            live: Arc::new(DashMap::new()),
        }
    }

    /// Add or replace a pipeline template
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        Arc::make_mut(&mut self.pipelines).insert(pipeline.name().to_string(), Arc::new(pipeline));
        self
    }

    pub fn ledger(&self) -> &Arc<ProvenanceLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.get(name).map(|p| p.as_ref())
    }

    /// Status of every registered capability
    pub fn capabilities(&self) -> Vec<CapabilityStatus> {
        self.registry.list_registered()
    }

    /// Start the default pipeline for a subject
    pub async fn submit(&self, subject_id: SubjectId, payload: Value) -> Result<WorkflowId> {
        let pipeline = self.config.default_pipeline.clone();
        self.submit_with(&pipeline, subject_id, payload).await
    }

    /// Start a named pipeline for a subject. Returns once the workflow is
    /// persisted as `PENDING`; execution continues in the background.
    pub async fn submit_with(
        &self,
        pipeline: &str,
        subject_id: SubjectId,
        payload: Value,
    ) -> Result<WorkflowId> {
        let pipeline = self
            .pipelines
            .get(pipeline)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownPipeline {
                name: pipeline.to_string(),
            })?;

        let record = WorkflowRecord::new(subject_id, payload, &pipeline);
        let workflow_id = record.workflow_id;
        let span = tracing::info_span!(
            "workflow",
            workflow_id = %workflow_id,
            subject_id = %record.subject_id,
            pipeline = %pipeline.name()
        );
        self.store.save_workflow_state(&workflow_id, &record).await?;

        let (done, _) = watch::channel(false);
        let live = Arc::new(LiveWorkflow {
            record: Mutex::new(record),
            done,
        });
        self.live.insert(workflow_id, Arc::clone(&live));

        let engine = self.clone();
        tokio::spawn(
            async move {
                tracing::info!("Workflow submitted");
                engine.run(pipeline, live).await;
            }
            .instrument(span),
        );

        Ok(workflow_id)
    }

    /// Current state and per-step results
    pub async fn status(&self, workflow_id: &WorkflowId) -> Result<WorkflowStatus> {
        if let Some(live) = self.live.get(workflow_id) {
            return Ok(live.record.lock().status());
        }
        self.store
            .load_workflow_state(workflow_id)
            .await?
            .map(|record| record.status())
            .ok_or(WorkflowError::NotFound {
                workflow_id: *workflow_id,
            })
    }

    /// Resolve once the workflow reaches a terminal state
    pub async fn wait(&self, workflow_id: &WorkflowId) -> Result<WorkflowStatus> {
        let live = self.live.get(workflow_id).map(|entry| Arc::clone(entry.value()));
        if let Some(live) = live {
            let mut done = live.done.subscribe();
            // a closed channel means the run task is gone; report what it left
            let _ = done.wait_for(|finished| *finished).await;
            return Ok(live.record.lock().status());
        }
        self.status(workflow_id).await
    }

    /// Ids of workflows that have not finished yet
    pub fn live_workflows(&self) -> Vec<WorkflowId> {
        self.live.iter().map(|entry| *entry.key()).collect()
    }

    async fn run(&self, pipeline: Arc<Pipeline>, live: Arc<LiveWorkflow>) {
        let workflow_id = live.record.lock().workflow_id;

        let timeout = self.config.workflow_timeout();
        let terminal = match tokio::time::timeout(timeout, self.drive(&pipeline, &live)).await {
            Ok(()) => {
                self.transition(&live, WorkflowState::Aggregating).await;
                let mut record = live.record.lock();
                cancel_unsettled(&mut record, "step did not report a result");
                record.outcome()
            }
            Err(_) => {
                // dropping the drive future aborted every in-flight step
                tracing::warn!(timeout_ms = self.config.workflow_timeout_ms, "Workflow timed out");
                cancel_unsettled(&mut live.record.lock(), "workflow timed out");
                WorkflowState::TimedOut
            }
        };

        self.transition(&live, terminal).await;
        live.done.send_replace(true);
        self.live.remove(&workflow_id);
        tracing::info!(state = ?terminal, "Workflow finished");
    }

    async fn drive(&self, pipeline: &Pipeline, live: &LiveWorkflow) {
        self.transition(live, WorkflowState::Dispatching).await;

        let mut in_flight: JoinSet<StepCompletion> = JoinSet::new();
        let mut awaiting = false;
        loop {
            if self.dispatch_ready(pipeline, live, &mut in_flight) {
                self.persist(live).await;
            }
            if !awaiting && !in_flight.is_empty() {
                self.transition(live, WorkflowState::AwaitingAgents).await;
                awaiting = true;
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            match joined {
                Ok(completion) => {
                    self.complete_step(live, completion);
                    self.persist(live).await;
                }
                Err(e) => tracing::error!(error = %e, "Step task ended abnormally"),
            }
        }
    }

    /// Dispatch every pending step whose dependencies have settled, and
    /// cancel those with a failed dependency. Returns whether anything changed.
    fn dispatch_ready(
        &self,
        pipeline: &Pipeline,
        live: &LiveWorkflow,
        in_flight: &mut JoinSet<StepCompletion>,
    ) -> bool {
        let mut record = live.record.lock();
        let mut changed = false;

        // cancellations can make further steps decidable, so sweep to a fixpoint
        loop {
            let mut progressed = false;
            for step in pipeline.steps() {
                if record.step(&step.name).map(|s| s.status) != Some(StepStatus::Pending) {
                    continue;
                }

                // (dependency, status, optional); a missing record counts as cancelled
                let deps: Vec<(&TaskType, StepStatus, bool)> = step
                    .depends_on
                    .iter()
                    .map(|d| match record.step(d) {
                        Some(s) => (d, s.status, s.optional),
                        None => (d, StepStatus::Cancelled, false),
                    })
                    .collect();
                if !deps.iter().all(|(_, status, _)| status.is_settled()) {
                    continue;
                }

                // A failed optional dependency is skipped; one that was itself
                // cancelled still carries an upstream failure and propagates it.
                let blocking = deps.iter().find(|(_, status, optional)| match status {
                    StepStatus::Succeeded => false,
                    StepStatus::Failed => !optional,
                    _ => true,
                });
                if let Some((failed, _, _)) = blocking {
                    tracing::info!(
                        task_type = %step.name,
                        dependency = %failed,
                        "Cancelling step after dependency failure"
                    );
                    if let Some(entry) = record.step_mut(&step.name) {
                        entry.status = StepStatus::Cancelled;
                        entry.result = Some(unexecuted(TaskError::DependencyFailed {
                            dependency: failed.to_string(),
                        }));
                    }
                } else {
                    let task = self.build_task(pipeline, step, &record);
                    if let Some(entry) = record.step_mut(&step.name) {
                        entry.status = StepStatus::Running;
                    }
                    let ctx = StepContext {
                        registry: Arc::clone(&self.registry),
                        ledger: Arc::clone(&self.ledger),
                        step: step.clone(),
                        policy: step.retry.clone().unwrap_or_else(|| self.config.retry.clone()),
                        task,
                    };
                    let span = tracing::info_span!("step", task_type = %step.name);
                    in_flight.spawn(execute_step(ctx).instrument(span));
                }
                progressed = true;
                changed = true;
            }
            if !progressed {
                break;
            }
        }

        changed
    }

    fn build_task(&self, pipeline: &Pipeline, step: &Step, record: &WorkflowRecord) -> Task {
        let upstream: BTreeMap<TaskType, Value> = pipeline
            .ancestors(&step.name)
            .into_iter()
            .filter_map(|name| {
                let value = record.step(&name)?.result.as_ref()?.outcome.value()?.clone();
                Some((name, value))
            })
            .collect();
        let dependencies = step
            .depends_on
            .iter()
            .filter_map(|d| record.step(d).map(|s| s.task_id))
            .collect();
        let task_id = record
            .step(&step.name)
            .map(|s| s.task_id)
            .unwrap_or_default();

        Task {
            id: task_id,
            workflow_id: record.workflow_id,
            subject_id: record.subject_id.clone(),
            task_type: step.name.clone(),
            payload: record.payload.clone(),
            upstream,
            dependencies,
            attempt: 0,
            deadline: Utc::now(),
        }
    }

    fn complete_step(&self, live: &LiveWorkflow, completion: StepCompletion) {
        let mut record = live.record.lock();
        let Some(entry) = record.step_mut(&completion.task_type) else {
            return;
        };
        entry.status = if completion.result.outcome.is_success() {
            StepStatus::Succeeded
        } else {
            StepStatus::Failed
        };

        match completion.result.outcome.error() {
            None => tracing::info!(
                task_type = %completion.task_type,
                attempts = completion.result.attempts,
                transaction_id = ?completion.result.transaction_id,
                "Step succeeded"
            ),
            Some(e) => tracing::warn!(
                task_type = %completion.task_type,
                attempts = completion.result.attempts,
                optional = entry.optional,
                error = %e,
                "Step failed"
            ),
        }
        entry.result = Some(completion.result);
        record.updated_at = Utc::now();
    }

    async fn transition(&self, live: &LiveWorkflow, next: WorkflowState) {
        {
            let mut record = live.record.lock();
            if let Err(e) = record.transition(next) {
                tracing::error!(error = %e, "Rejected workflow state transition");
                return;
            }
        }
        tracing::debug!(state = ?next, "Workflow state changed");
        self.persist(live).await;
    }

    async fn persist(&self, live: &LiveWorkflow) {
        let snapshot = live.record.lock().clone();
        if let Err(e) = self
            .store
            .save_workflow_state(&snapshot.workflow_id, &snapshot)
            .await
        {
            tracing::error!(error = %e, "Failed to save workflow snapshot");
        }
    }
}

fn unexecuted(error: TaskError) -> TaskResult {
    TaskResult {
        outcome: TaskOutcome::Failure(error),
        attempts: 0,
        duration: Duration::ZERO,
        completed_at: Utc::now(),
        transaction_id: None,
    }
}

fn cancel_unsettled(record: &mut WorkflowRecord, reason: &str) {
    for step in &mut record.steps {
        if !step.status.is_settled() {
            step.status = StepStatus::Cancelled;
            step.result = Some(unexecuted(TaskError::Cancelled {
                reason: reason.to_string(),
            }));
        }
    }
}

fn deadline_after(timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

async fn execute_step(ctx: StepContext) -> StepCompletion {
    let started = Instant::now();
    let StepContext {
        registry,
        ledger,
        step,
        policy,
        mut task,
    } = ctx;

    let (outcome, attempts) = run_attempts(&registry, &policy, &mut task).await;

    let mut transaction_id = None;
    let outcome = match outcome {
        Ok(value) if step.ledger_worthy => match record_step(&ledger, &task, &value, attempts).await {
            Ok(id) => {
                transaction_id = Some(id);
                TaskOutcome::Success(value)
            }
            Err(e) => {
                tracing::error!(error = %e, "Ledger rejected step result");
                TaskOutcome::Failure(TaskError::LedgerRejected {
                    reason: e.to_string(),
                })
            }
        },
        Ok(value) => TaskOutcome::Success(value),
        Err(e) => TaskOutcome::Failure(e),
    };

    StepCompletion {
        task_type: step.name,
        result: TaskResult {
            outcome,
            attempts,
            duration: started.elapsed(),
            completed_at: Utc::now(),
            transaction_id,
        },
    }
}

/// Attempt loop: per-attempt deadline, retry on timeout or retryable
/// failure, exponential backoff in between
async fn run_attempts(
    registry: &CapabilityRegistry,
    policy: &RetryPolicy,
    task: &mut Task,
) -> (std::result::Result<Value, TaskError>, u32) {
    let handle = match registry.resolve(&task.task_type) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "Cannot dispatch step");
            return (
                Err(TaskError::UnknownCapability {
                    task_type: task.task_type.to_string(),
                }),
                0,
            );
        }
    };

    let max_attempts = policy.attempts();
    let timeout = policy.attempt_timeout();
    let mut last_error = TaskError::Failure {
        reason: "no attempt made".to_string(),
    };

    for attempt in 1..=max_attempts {
        task.attempt = attempt;
        task.deadline = deadline_after(timeout);

        let call = AssertUnwindSafe(handle.process(&*task)).catch_unwind();
        let retry = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Ok(value))) => return (Ok(value), attempt),
            Ok(Ok(Err(failure))) => {
                tracing::warn!(
                    attempt,
                    retryable = failure.retryable,
                    reason = %failure.reason,
                    "Agent attempt failed"
                );
                let retryable = failure.retryable;
                last_error = TaskError::Failure {
                    reason: failure.reason,
                };
                retryable
            }
            Ok(Err(_)) => {
                tracing::error!(attempt, "Agent panicked");
                last_error = TaskError::Failure {
                    reason: "agent panicked".to_string(),
                };
                false
            }
            Err(_) => {
                tracing::warn!(attempt, timeout_ms = policy.attempt_timeout_ms, "Agent attempt timed out");
                last_error = TaskError::Timeout { attempts: attempt };
                true
            }
        };

        if !retry {
            return (Err(last_error), attempt);
        }
        if attempt < max_attempts {
            let wait = policy.backoff(attempt);
            tracing::debug!(attempt, backoff_ms = wait.as_millis() as u64, "Retrying step");
            tokio::time::sleep(wait).await;
        }
    }

    (Err(last_error), max_attempts)
}

async fn record_step(
    ledger: &ProvenanceLedger,
    task: &Task,
    value: &Value,
    attempts: u32,
) -> std::result::Result<TransactionId, LedgerError> {
    let payload = json!({
        "workflow_id": task.workflow_id,
        "step": task.task_type,
        "attempts": attempts,
        "result": value,
    });
    ledger
        .record_transaction_by(
            &task.subject_id,
            task.task_type.as_str(),
            payload,
            &format!("workflow:{}", task.workflow_id),
        )
        .await
}
