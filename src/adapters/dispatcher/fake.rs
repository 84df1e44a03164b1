//! In-memory `ExecutorDispatcher` test double.
//!
//! A real container driver (Docker/E2B) is explicitly out of scope (§1).
//! This fake tracks a minimal per-executor record so `SandboxManager` and
//! `scheduler` logic can be exercised without a container runtime: submit
//! allocates a name, status probes read the recorded state, and pause/
//! unpause/delete mutate it in place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::DispatcherError;
use crate::domain::ports::{ContainerStatus, ExecutorDispatcher, SubmitOutcome};

#[derive(Debug, Clone)]
struct FakeExecutor {
    task_id: Option<String>,
    status: String,
    paused: bool,
    oom_killed: bool,
    exit_code: Option<i32>,
    address: Option<String>,
}

impl FakeExecutor {
    fn new(task_id: Option<String>) -> Self {
        Self {
            task_id,
            status: "running".to_string(),
            paused: false,
            oom_killed: false,
            exit_code: None,
            address: Some("127.0.0.1:0".to_string()),
        }
    }
}

pub struct FakeExecutorDispatcher {
    next_id: AtomicU64,
    executors: Mutex<HashMap<String, FakeExecutor>>,
}

impl Default for FakeExecutorDispatcher {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            executors: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeExecutorDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: force an executor into a crashed state as the crash
    /// forensics path (§4.5.8) would observe from a real driver.
    pub fn simulate_crash(&self, executor_name: &str, oom_killed: bool, exit_code: i32) {
        let mut executors = self.executors.lock().expect("fake dispatcher lock poisoned");
        if let Some(exec) = executors.get_mut(executor_name) {
            exec.status = "exited".to_string();
            exec.oom_killed = oom_killed;
            exec.exit_code = Some(exit_code);
        }
    }

    /// Test hook: remove an executor's record entirely, as if the
    /// container vanished without a trace.
    pub fn simulate_vanish(&self, executor_name: &str) {
        self.executors.lock().expect("fake dispatcher lock poisoned").remove(executor_name);
    }
}

#[async_trait]
impl ExecutorDispatcher for FakeExecutorDispatcher {
    async fn submit_executor(
        &self,
        task_data: Value,
        _callback_url: Option<&str>,
    ) -> Result<SubmitOutcome, DispatcherError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let executor_name = format!("executor-{id}");
        let task_id = task_data
            .get("task_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.executors
            .lock()
            .expect("fake dispatcher lock poisoned")
            .insert(executor_name.clone(), FakeExecutor::new(task_id));
        Ok(SubmitOutcome {
            executor_name: Some(executor_name),
            error_msg: None,
        })
    }

    async fn delete_executor(&self, executor_name: &str) -> Result<(), DispatcherError> {
        self.executors
            .lock()
            .expect("fake dispatcher lock poisoned")
            .remove(executor_name);
        Ok(())
    }

    async fn cancel_executor(&self, executor_name: &str) -> Result<(), DispatcherError> {
        let mut executors = self.executors.lock().expect("fake dispatcher lock poisoned");
        if let Some(exec) = executors.get_mut(executor_name) {
            exec.status = "cancelled".to_string();
        }
        Ok(())
    }

    async fn pause_executor(&self, executor_name: &str) -> Result<(), DispatcherError> {
        let mut executors = self.executors.lock().expect("fake dispatcher lock poisoned");
        let exec = executors
            .get_mut(executor_name)
            .ok_or_else(|| DispatcherError::PauseFailed(executor_name.to_string()))?;
        exec.paused = true;
        exec.status = "paused".to_string();
        Ok(())
    }

    async fn unpause_executor(&self, executor_name: &str) -> Result<(), DispatcherError> {
        let mut executors = self.executors.lock().expect("fake dispatcher lock poisoned");
        let exec = executors
            .get_mut(executor_name)
            .ok_or_else(|| DispatcherError::PauseFailed(executor_name.to_string()))?;
        exec.paused = false;
        exec.status = "running".to_string();
        Ok(())
    }

    async fn get_container_address(&self, executor_name: &str) -> Result<Option<String>, DispatcherError> {
        Ok(self
            .executors
            .lock()
            .expect("fake dispatcher lock poisoned")
            .get(executor_name)
            .and_then(|e| e.address.clone()))
    }

    async fn get_container_status(&self, executor_name: &str) -> Result<ContainerStatus, DispatcherError> {
        let executors = self.executors.lock().expect("fake dispatcher lock poisoned");
        match executors.get(executor_name) {
            None => Ok(ContainerStatus {
                exists: false,
                status: "absent".to_string(),
                oom_killed: false,
                exit_code: None,
                error_msg: None,
            }),
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
        Ok(self.executors.lock().expect("fake dispatcher lock poisoned").len() as u32)
    }

    async fn get_executor_task_id(&self, executor_name: &str) -> Result<Option<String>, DispatcherError> {
        Ok(self
            .executors
            .lock()
            .expect("fake dispatcher lock poisoned")
            .get(executor_name)
            .and_then(|e| e.task_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_then_status_round_trips() {
        let dispatcher = FakeExecutorDispatcher::new();
        let outcome = dispatcher
            .submit_executor(serde_json::json!({"task_id": "t-1"}), None)
            .await
            .unwrap();
        let name = outcome.executor_name.unwrap();
        let status = dispatcher.get_container_status(&name).await.unwrap();
        assert!(status.exists);
        assert!(status.is_running_status());
        assert_eq!(
            dispatcher.get_executor_task_id(&name).await.unwrap().as_deref(),
            Some("t-1")
        );
    }

    #[tokio::test]
    async fn simulate_crash_marks_exited_with_exit_code() {
        let dispatcher = FakeExecutorDispatcher::new();
        let outcome = dispatcher
            .submit_executor(serde_json::json!({"task_id": "t-2"}), None)
            .await
            .unwrap();
        let name = outcome.executor_name.unwrap();
        dispatcher.simulate_crash(&name, true, 137);
        let status = dispatcher.get_container_status(&name).await.unwrap();
        assert!(!status.is_running_status());
        assert!(status.oom_killed);
        assert_eq!(status.exit_code, Some(137));
    }

    #[tokio::test]
    async fn simulate_vanish_reports_not_exists() {
        let dispatcher = FakeExecutorDispatcher::new();
        let outcome = dispatcher
            .submit_executor(serde_json::json!({"task_id": "t-3"}), None)
            .await
            .unwrap();
        let name = outcome.executor_name.unwrap();
        dispatcher.simulate_vanish(&name);
        let status = dispatcher.get_container_status(&name).await.unwrap();
        assert!(!status.exists);
    }

    #[tokio::test]
    async fn cancel_executor_marks_cancelled_without_removing_the_record() {
        let dispatcher = FakeExecutorDispatcher::new();
        let outcome = dispatcher
            .submit_executor(serde_json::json!({"task_id": "t-4"}), None)
            .await
            .unwrap();
        let name = outcome.executor_name.unwrap();
        dispatcher.cancel_executor(&name).await.unwrap();
        let status = dispatcher.get_container_status(&name).await.unwrap();
        assert!(status.exists);
        assert_eq!(status.status, "cancelled");
    }

    #[tokio::test]
    async fn cancel_executor_on_absent_name_is_not_an_error() {
        let dispatcher = FakeExecutorDispatcher::new();
        dispatcher.cancel_executor("no-such-executor").await.unwrap();
    }

    #[tokio::test]
    async fn delete_executor_removes_record() {
        let dispatcher = FakeExecutorDispatcher::new();
        let outcome = dispatcher
            .submit_executor(serde_json::json!({}), None)
            .await
            .unwrap();
        let name = outcome.executor_name.unwrap();
        dispatcher.delete_executor(&name).await.unwrap();
        assert_eq!(dispatcher.get_executor_count().await.unwrap(), 0);
    }
}
