//! Capability registry: task type → agent instance

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use truemesh_types::TaskType;

use crate::error::{AgentFailure, RegistryError, Result};
use crate::task::Task;

/// The contract every capability implementation satisfies
#[async_trait]
pub trait Agent: Send + Sync {
    /// Process one attempt of a task
    async fn process(&self, task: &Task) -> std::result::Result<Value, AgentFailure>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How many recent task durations to keep per capability
    pub recent_window: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { recent_window: 16 }
    }
}

/// Status row reported by [`CapabilityRegistry::list_registered`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityStatus {
    pub task_type: TaskType,
    /// Executions currently in flight
    pub live_count: usize,
    /// Total executions finished (success, failure or abandoned)
    pub completed: u64,
    /// Most recent durations, oldest first
    pub recent_durations: Vec<Duration>,
}

#[derive(Debug)]
struct CapabilityStats {
    live: AtomicUsize,
    completed: AtomicU64,
    recent: Mutex<VecDeque<Duration>>,
    window: usize,
}

impl CapabilityStats {
    fn new(window: usize) -> Self {
        Self {
            live: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::with_capacity(window)),
            window,
        }
    }

    fn record(&self, elapsed: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if self.window == 0 {
            return;
        }
        let mut recent = self.recent.lock();
        if recent.len() == self.window {
            recent.pop_front();
        }
        recent.push_back(elapsed);
    }
}

/// Keeps `live` accurate even when the engine drops the call on timeout.
struct LiveGuard<'a> {
    stats: &'a CapabilityStats,
    started: Instant,
}

impl<'a> LiveGuard<'a> {
    fn enter(stats: &'a CapabilityStats) -> Self {
        stats.live.fetch_add(1, Ordering::AcqRel);
        Self {
            stats,
            started: Instant::now(),
        }
    }
}

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.stats.live.fetch_sub(1, Ordering::AcqRel);
        self.stats.record(self.started.elapsed());
    }
}

/// A resolved capability, cheap to clone and safe to call concurrently
#[derive(Clone)]
pub struct AgentHandle {
    task_type: TaskType,
    agent: Arc<dyn Agent>,
    stats: Arc<CapabilityStats>,
}

impl AgentHandle {
    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    /// Invoke the agent, tracking the call in the capability's statistics
    pub async fn process(&self, task: &Task) -> std::result::Result<Value, AgentFailure> {
        let _live = LiveGuard::enter(&self.stats);
        self.agent.process(task).await
    }

    pub fn live_count(&self) -> usize {
        self.stats.live.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("task_type", &self.task_type)
            .field("live", &self.live_count())
            .finish()
    }
}

/// Maps task types to agent instances.
///
/// `register` takes `&mut self`, so once the registry is wrapped in an `Arc`
/// and handed to the engine it can no longer change.
pub struct CapabilityRegistry {
    config: RegistryConfig,
    agents: HashMap<TaskType, AgentHandle>,
}

impl CapabilityRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            agents: HashMap::new(),
        }
    }

    /// Register the agent built by `factory` under `task_type`
    pub fn register<F, A>(&mut self, task_type: impl Into<TaskType>, factory: F) -> Result<()>
    where
        F: FnOnce() -> A,
        A: Agent + 'static,
    {
        self.register_shared(task_type, Arc::new(factory()))
    }

    /// Register an already constructed, possibly shared, agent
    pub fn register_shared(
        &mut self,
        task_type: impl Into<TaskType>,
        agent: Arc<dyn Agent>,
    ) -> Result<()> {
        let task_type = task_type.into();
        if self.agents.contains_key(&task_type) {
            return Err(RegistryError::DuplicateCapability {
                task_type: task_type.to_string(),
            });
        }

        tracing::info!(task_type = %task_type, "Registered capability");
        let handle = AgentHandle {
            task_type: task_type.clone(),
            agent,
            stats: Arc::new(CapabilityStats::new(self.config.recent_window)),
        };
        self.agents.insert(task_type, handle);
        Ok(())
    }

    /// Look up the agent for a task type
    pub fn resolve(&self, task_type: &TaskType) -> Result<AgentHandle> {
        self.agents
            .get(task_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCapability {
                task_type: task_type.to_string(),
            })
    }

    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.agents.contains_key(task_type)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Status of every registered capability, sorted by task type
    pub fn list_registered(&self) -> Vec<CapabilityStatus> {
        let mut rows: Vec<CapabilityStatus> = self
            .agents
            .values()
            .map(|handle| CapabilityStatus {
                task_type: handle.task_type.clone(),
                live_count: handle.stats.live.load(Ordering::Acquire),
                completed: handle.stats.completed.load(Ordering::Relaxed),
                recent_durations: handle.stats.recent.lock().iter().copied().collect(),
            })
            .collect();
        rows.sort_by(|a, b| a.task_type.cmp(&b.task_type));
        rows
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::fixtures;
    use serde_json::json;
    use tokio::sync::Notify;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        async fn process(&self, task: &Task) -> std::result::Result<Value, AgentFailure> {
            Ok(json!({ "echo": task.task_type.as_str() }))
        }
    }

    struct Parked(Arc<Notify>);

    #[async_trait]
    impl Agent for Parked {
        async fn process(&self, _task: &Task) -> std::result::Result<Value, AgentFailure> {
            self.0.notified().await;
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_unknown_capability() {
        let registry = CapabilityRegistry::default();
        let err = registry.resolve(&TaskType::new("missing")).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownCapability {
                task_type: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = CapabilityRegistry::default();
        registry.register("echo", || Echo).unwrap();
        assert!(matches!(
            registry.register("echo", || Echo),
            Err(RegistryError::DuplicateCapability { .. })
        ));
    }

    #[tokio::test]
    async fn test_handle_records_durations() {
        let mut registry = CapabilityRegistry::new(RegistryConfig { recent_window: 2 });
        registry.register("echo", || Echo).unwrap();
        let handle = registry.resolve(&TaskType::new("echo")).unwrap();

        for _ in 0..3 {
            let out = handle.process(&fixtures::task("echo", json!({}))).await.unwrap();
            assert_eq!(out["echo"], "echo");
        }

        let status = registry.list_registered();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].completed, 3);
        assert_eq!(status[0].recent_durations.len(), 2);
        assert_eq!(status[0].live_count, 0);
    }

    #[tokio::test]
    async fn test_live_count_tracks_in_flight_calls() {
        let gate = Arc::new(Notify::new());
        let mut registry = CapabilityRegistry::default();
        registry
            .register_shared("parked", Arc::new(Parked(gate.clone())))
            .unwrap();
        let registry = Arc::new(registry);

        let handle = registry.resolve(&TaskType::new("parked")).unwrap();
        let call = tokio::spawn(async move {
            handle.process(&fixtures::task("parked", json!({}))).await
        });

        while registry.list_registered()[0].live_count == 0 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();
        call.await.unwrap().unwrap();
        assert_eq!(registry.list_registered()[0].live_count, 0);
    }
}
