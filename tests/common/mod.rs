//! Shared test doubles for the black-box scenario tests in `tests/`.
//!
//! `FakeSandboxRepository` is a plain in-memory `SandboxRepository`; it has
//! no production counterpart (the real one is Redis-backed). The
//! dispatcher double here differs from `adapters::dispatcher::FakeExecutorDispatcher`
//! in one respect: its container address is configurable, so tests can
//! point `wait_for_ready`/`probe_health` at a real `mockito` server instead
//! of the production fake's unreachable `127.0.0.1:0`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use wegent_control_plane::domain::error::{DispatcherError, HeartbeatError, RepositoryError};
use wegent_control_plane::domain::models::{Execution, HeartbeatKind, Sandbox};
use wegent_control_plane::domain::ports::{ContainerStatus, ExecutorDispatcher, HeartbeatStore, SandboxRepository, SubmitOutcome};

/// In-memory `HeartbeatStore`. Tests that only exercise the
/// create/run-execution paths never touch heartbeats; this exists purely
/// to satisfy `SandboxManager`'s generic bound.
#[derive(Default)]
pub struct FakeHeartbeatStore {
    values: Mutex<HashMap<(String, &'static str), i64>>,
}

impl FakeHeartbeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_kind(kind: HeartbeatKind) -> &'static str {
        match kind {
            HeartbeatKind::Sandbox => "sandbox",
            HeartbeatKind::Task => "task",
        }
    }

    /// Directly seed (or clear, via `None`) a heartbeat's last-seen time,
    /// bypassing `update_heartbeat`'s "now" stamp.
    pub fn seed(&self, id: &str, kind: HeartbeatKind, unix_secs: Option<i64>) {
        let key = (id.to_string(), Self::key_kind(kind));
        let mut values = self.values.lock().unwrap();
        match unix_secs {
            Some(v) => {
                values.insert(key, v);
            }
            None => {
                values.remove(&key);
            }
        }
    }
}

#[async_trait]
impl HeartbeatStore for FakeHeartbeatStore {
    async fn update_heartbeat(&self, id: &str, kind: HeartbeatKind) -> Result<(), HeartbeatError> {
        self.values.lock().unwrap().insert((id.to_string(), Self::key_kind(kind)), chrono::Utc::now().timestamp());
        Ok(())
    }

    async fn check_heartbeat(&self, id: &str, kind: HeartbeatKind, timeout_secs: i64) -> Result<bool, HeartbeatError> {
        let now = chrono::Utc::now().timestamp();
        let alive = self
            .values
            .lock()
            .unwrap()
            .get(&(id.to_string(), Self::key_kind(kind)))
            .map(|last| now - last < timeout_secs)
            .unwrap_or(false);
        Ok(alive)
    }

    async fn get_last_heartbeat(&self, id: &str, kind: HeartbeatKind) -> Result<Option<i64>, HeartbeatError> {
        Ok(self.values.lock().unwrap().get(&(id.to_string(), Self::key_kind(kind))).copied())
    }

    async fn delete_heartbeat(&self, id: &str, kind: HeartbeatKind) -> Result<(), HeartbeatError> {
        self.values.lock().unwrap().remove(&(id.to_string(), Self::key_kind(kind)));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSandboxRepository {
    sandboxes: Mutex<HashMap<String, Sandbox>>,
    active_set: Mutex<Vec<String>>,
    executions: Mutex<HashMap<(String, String), Execution>>,
    bindings: Mutex<HashMap<String, String>>,
}

impl FakeSandboxRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SandboxRepository for FakeSandboxRepository {
    async fn save_sandbox(&self, sandbox: &Sandbox) -> Result<bool, RepositoryError> {
        if sandbox.task_id().is_none() {
            return Ok(false);
        }
        self.sandboxes.lock().unwrap().insert(sandbox.sandbox_id.clone(), sandbox.clone());
        let mut active = self.active_set.lock().unwrap();
        if !active.contains(&sandbox.sandbox_id) {
            active.push(sandbox.sandbox_id.clone());
        }
        Ok(true)
    }

    async fn load_sandbox(&self, sandbox_id: &str) -> Result<Option<Sandbox>, RepositoryError> {
        Ok(self.sandboxes.lock().unwrap().get(sandbox_id).cloned())
    }

    async fn delete_sandbox(&self, sandbox_id: &str) -> Result<(), RepositoryError> {
        self.sandboxes.lock().unwrap().remove(sandbox_id);
        self.active_set.lock().unwrap().retain(|id| id != sandbox_id);
        Ok(())
    }

    async fn get_active_sandbox_ids(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self.active_set.lock().unwrap().clone())
    }

    async fn get_expired_sandbox_ids(&self, max_age_secs: i64) -> Result<Vec<String>, RepositoryError> {
        let now = chrono::Utc::now();
        let sandboxes = self.sandboxes.lock().unwrap();
        Ok(self
            .active_set
            .lock()
            .unwrap()
            .iter()
            .filter(|id| {
                sandboxes
                    .get(*id)
                    .and_then(|s| s.expires_at)
                    .map(|exp| (now - exp).num_seconds() >= max_age_secs || now >= exp)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn remove_from_active_set(&self, sandbox_id: &str) -> Result<(), RepositoryError> {
        self.active_set.lock().unwrap().retain(|id| id != sandbox_id);
        Ok(())
    }

    async fn update_activity_timestamp(&self, sandbox_id: &str) -> Result<(), RepositoryError> {
        if let Some(sandbox) = self.sandboxes.lock().unwrap().get_mut(sandbox_id) {
            sandbox.touch();
        }
        Ok(())
    }

    async fn save_execution(&self, execution: &Execution) -> Result<bool, RepositoryError> {
        let Some(subtask_id) = execution.subtask_id().map(str::to_string) else {
            return Ok(false);
        };
        self.executions
            .lock()
            .unwrap()
            .insert((execution.sandbox_id.clone(), subtask_id), execution.clone());
        Ok(true)
    }

    async fn load_execution(&self, sandbox_id: &str, subtask_id: &str) -> Result<Option<Execution>, RepositoryError> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .get(&(sandbox_id.to_string(), subtask_id.to_string()))
            .cloned())
    }

    async fn list_executions(&self, sandbox_id: &str) -> Result<Vec<Execution>, RepositoryError> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|((sid, _), _)| sid == sandbox_id)
            .map(|(_, execution)| execution.clone())
            .collect())
    }

    async fn save_executor_binding(&self, task_id: &str, executor_name: &str, _ttl_secs: i64) -> Result<(), RepositoryError> {
        self.bindings.lock().unwrap().insert(task_id.to_string(), executor_name.to_string());
        Ok(())
    }

    async fn load_executor_binding(&self, task_id: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self.bindings.lock().unwrap().get(task_id).cloned())
    }
}

#[derive(Debug, Clone)]
struct ConfigurableExecutor {
    task_id: Option<String>,
    status: String,
    paused: bool,
    oom_killed: bool,
    exit_code: Option<i32>,
    address: Option<String>,
}

/// Dispatcher double whose `address` is set by the caller at submit time
/// (via [`ConfigurableDispatcher::set_next_address`]), so a real HTTP probe
/// can reach it.
#[derive(Default)]
pub struct ConfigurableDispatcher {
    next_id: AtomicU64,
    next_address: Mutex<Option<String>>,
    executors: Mutex<HashMap<String, ConfigurableExecutor>>,
}

impl ConfigurableDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The address the next `submit_executor` call should bind to.
    pub fn set_next_address(&self, address: impl Into<String>) {
        *self.next_address.lock().unwrap() = Some(address.into());
    }

    pub fn simulate_crash(&self, executor_name: &str, oom_killed: bool, exit_code: i32) {
        let mut executors = self.executors.lock().unwrap();
        if let Some(exec) = executors.get_mut(executor_name) {
            exec.status = "exited".to_string();
            exec.oom_killed = oom_killed;
            exec.exit_code = Some(exit_code);
        }
    }
}

#[async_trait]
impl ExecutorDispatcher for ConfigurableDispatcher {
    async fn submit_executor(&self, task_data: Value, _callback_url: Option<&str>) -> Result<SubmitOutcome, DispatcherError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let executor_name = format!("executor-{id}");
        let task_id = task_data.get("task_id").and_then(Value::as_str).map(str::to_string);
        let address = self.next_address.lock().unwrap().take();
        self.executors.lock().unwrap().insert(
            executor_name.clone(),
            ConfigurableExecutor { task_id, status: "running".to_string(), paused: false, oom_killed: false, exit_code: None, address },
        );
        Ok(SubmitOutcome { executor_name: Some(executor_name), error_msg: None })
    }

    async fn delete_executor(&self, executor_name: &str) -> Result<(), DispatcherError> {
        self.executors.lock().unwrap().remove(executor_name);
        Ok(())
    }

    async fn cancel_executor(&self, executor_name: &str) -> Result<(), DispatcherError> {
        if let Some(exec) = self.executors.lock().unwrap().get_mut(executor_name) {
            exec.status = "cancelled".to_string();
        }
        Ok(())
    }

    async fn pause_executor(&self, executor_name: &str) -> Result<(), DispatcherError> {
        let mut executors = self.executors.lock().unwrap();
        let exec = executors.get_mut(executor_name).ok_or_else(|| DispatcherError::PauseFailed(executor_name.to_string()))?;
        exec.paused = true;
        exec.status = "paused".to_string();
        Ok(())
    }

    async fn unpause_executor(&self, executor_name: &str) -> Result<(), DispatcherError> {
        let mut executors = self.executors.lock().unwrap();
        let exec = executors.get_mut(executor_name).ok_or_else(|| DispatcherError::PauseFailed(executor_name.to_string()))?;
        exec.paused = false;
        exec.status = "running".to_string();
        Ok(())
    }

    async fn get_container_address(&self, executor_name: &str) -> Result<Option<String>, DispatcherError> {
        Ok(self.executors.lock().unwrap().get(executor_name).and_then(|e| e.address.clone()))
    }

    async fn get_container_status(&self, executor_name: &str) -> Result<ContainerStatus, DispatcherError> {
        let executors = self.executors.lock().unwrap();
        match executors.get(executor_name) {
            None => Ok(ContainerStatus { exists: false, status: "absent".to_string(), oom_killed: false, exit_code: None, error_msg: None }),
            Some(exec) => Ok(ContainerStatus {
                exists: true,
                status: exec.status.clone(),
                oom_killed: exec.oom_killed,
                exit_code: exec.exit_code,
                error_msg: None,
            }),
        }
    }

    async fn get_executor_count(&self) -> Result<u32, DispatcherError> {
        Ok(self.executors.lock().unwrap().len() as u32)
    }

    async fn get_executor_task_id(&self, executor_name: &str) -> Result<Option<String>, DispatcherError> {
        Ok(self.executors.lock().unwrap().get(executor_name).and_then(|e| e.task_id.clone()))
    }
}
