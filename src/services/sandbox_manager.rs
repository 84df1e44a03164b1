//! Central lifecycle orchestrator for sandboxes and executions (§4.5).
//!
//! Owns no storage of its own — every read/write goes through
//! `SandboxRepository`, `HeartbeatStore`, and `ExecutorDispatcher`, so
//! concurrent managers across replicas serialize only through Redis.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::domain::error::{ExecutionError, SandboxError};
use crate::domain::models::{Execution, HeartbeatConfig, HeartbeatKind, Sandbox, SandboxConfig, SandboxStatus, ShellType};
use crate::domain::ports::{ExecutorDispatcher, HeartbeatStore, SandboxRepository};
use crate::services::execution_runner;

pub struct SandboxManager<R, D, H>
where
    R: SandboxRepository,
    D: ExecutorDispatcher,
    H: HeartbeatStore,
{
    repo: Arc<R>,
    dispatcher: Arc<D>,
    heartbeats: Arc<H>,
    http: reqwest::Client,
    config: SandboxConfig,
    heartbeat_config: HeartbeatConfig,
    executor_image: String,
    callback_url: String,
}

impl<R, D, H> SandboxManager<R, D, H>
where
    R: SandboxRepository,
    D: ExecutorDispatcher,
    H: HeartbeatStore,
{
    pub fn new(
        repo: Arc<R>,
        dispatcher: Arc<D>,
        heartbeats: Arc<H>,
        config: SandboxConfig,
        heartbeat_config: HeartbeatConfig,
        executor_image: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            heartbeats,
            http: reqwest::Client::new(),
            config,
            heartbeat_config,
            executor_image: executor_image.into(),
            callback_url: callback_url.into(),
        }
    }

    async fn probe_health(&self, base_url: &str) -> bool {
        let url = format!("{}/", base_url.trim_end_matches('/'));
        matches!(self.http.get(&url).send().await, Ok(resp) if resp.status().is_success())
    }

    /// §4.5.1: create, or idempotently reuse, the sandbox for a task.
    pub async fn create_sandbox(
        &self,
        shell_type: ShellType,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        timeout_secs: Option<u64>,
        metadata: Map<String, Value>,
    ) -> Result<Sandbox, SandboxError> {
        let task_id = metadata
            .get("task_id")
            .and_then(Value::as_str)
            .ok_or(SandboxError::MissingTaskId)?
            .to_string();
        let timeout_secs = timeout_secs.unwrap_or(self.config.default_timeout_secs);
        let user_id = user_id.into();
        let user_name = user_name.into();

        if let Some(mut existing) = self.repo.load_sandbox(&task_id).await? {
            if existing.is_active() {
                if let Some(base_url) = existing.base_url.clone() {
                    if self.probe_health(&base_url).await {
                        existing.extend_expiry(timeout_secs as i64);
                        self.repo.save_sandbox(&existing).await?;
                        return Ok(existing);
                    }
                }
                self.cleanup_dead(&existing).await;
            }
        }

        // No live Sandbox record, but the task's container may still be
        // bound from a prior session (`task_executor:{task_id}`, §3/§6.3):
        // reattach to it instead of provisioning a new container.
        if let Some(bound_name) = self.repo.load_executor_binding(&task_id).await.unwrap_or(None) {
            if let Ok(Some(base_url)) = self.dispatcher.get_container_address(&bound_name).await {
                if self.probe_health(&base_url).await {
                    let mut sandbox =
                        Sandbox::new(task_id.clone(), shell_type, user_id.clone(), user_name.clone()).with_metadata(metadata.clone());
                    sandbox.container_name = Some(bound_name.clone());
                    sandbox
                        .mark_running(base_url)
                        .map_err(|e| SandboxError::InvalidTransition { from: "PENDING".into(), event: e })?;
                    sandbox.extend_expiry(timeout_secs as i64);
                    self.repo.save_sandbox(&sandbox).await?;
                    return Ok(sandbox);
                }
            }
        }

        let mut sandbox = Sandbox::new(task_id.clone(), shell_type, user_id, user_name).with_metadata(metadata);
        self.repo.save_sandbox(&sandbox).await?;

        let task_data = json!({
            "type": "sandbox",
            "prompt": "",
            "bot": [{ "shell_type": shell_type.as_str() }],
            "user_id": sandbox.user_id,
            "user_name": sandbox.user_name,
            "sandbox_id": sandbox.sandbox_id,
            "timeout": timeout_secs,
            "metadata": sandbox.metadata,
            "executor_image": self.executor_image,
        });

        let submit = self
            .dispatcher
            .submit_executor(task_data, Some(&self.callback_url))
            .await;

        let outcome = match submit {
            Ok(outcome) if outcome.executor_name.is_some() => outcome,
            Ok(outcome) => {
                let reason = outcome.error_msg.unwrap_or_else(|| "submit_executor returned no executor_name".to_string());
                sandbox.mark_failed(reason.clone());
                self.repo.save_sandbox(&sandbox).await?;
                return Err(SandboxError::Dispatcher(crate::domain::error::DispatcherError::SubmitFailed(reason)));
            }
            Err(err) => {
                sandbox.mark_failed(err.to_string());
                self.repo.save_sandbox(&sandbox).await?;
                return Err(SandboxError::Dispatcher(err));
            }
        };
        let executor_name = outcome.executor_name.expect("checked above");
        sandbox.container_name = Some(executor_name.clone());

        match self.wait_for_ready(&executor_name).await {
            Ok(base_url) => {
                sandbox
                    .mark_running(base_url)
                    .map_err(|e| SandboxError::InvalidTransition { from: "PENDING".into(), event: e })?;
                sandbox.extend_expiry(timeout_secs as i64);
                self.repo.save_sandbox(&sandbox).await?;
                if let Err(err) = self
                    .repo
                    .save_executor_binding(&task_id, &executor_name, self.config.redis_ttl_secs as i64)
                    .await
                {
                    tracing::warn!(error = %err, %task_id, "create_sandbox: failed to persist executor binding");
                }
                Ok(sandbox)
            }
            Err(reason) => {
                sandbox.mark_failed(reason);
                self.repo.save_sandbox(&sandbox).await?;
                let _ = self.dispatcher.delete_executor(&executor_name).await;
                Err(SandboxError::ReadyTimeout(Duration::from_secs(self.config.ready_timeout_secs)))
            }
        }
    }

    /// Poll `get_container_address` once per second up to `ready_timeout_secs`,
    /// then confirm the container's root endpoint answers 200 (§4.5.1 step 6).
    async fn wait_for_ready(&self, executor_name: &str) -> Result<String, String> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.config.ready_timeout_secs);
        loop {
            if let Ok(Some(base_url)) = self.dispatcher.get_container_address(executor_name).await {
                if self.probe_health(&base_url).await {
                    return Ok(base_url);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err("container did not become ready in time".to_string());
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn cleanup_dead(&self, sandbox: &Sandbox) {
        if let Some(name) = &sandbox.container_name {
            if let Err(err) = self.dispatcher.delete_executor(name).await {
                tracing::warn!(error = %err, sandbox_id = %sandbox.sandbox_id, "cleanup_dead: delete_executor failed, continuing");
            }
        }
        if let Err(err) = self.repo.delete_sandbox(&sandbox.sandbox_id).await {
            tracing::warn!(error = %err, sandbox_id = %sandbox.sandbox_id, "cleanup_dead: delete_sandbox failed");
        }
    }

    /// §4.5.2.
    pub async fn terminate_sandbox(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        let Some(mut sandbox) = self.repo.load_sandbox(sandbox_id).await? else {
            return Ok(());
        };
        if sandbox.is_terminal() || sandbox.status == SandboxStatus::Terminating {
            return Ok(());
        }
        sandbox
            .begin_terminate()
            .map_err(|e| SandboxError::InvalidTransition { from: sandbox.status.to_string(), event: e })?;
        self.repo.save_sandbox(&sandbox).await?;

        if let Some(name) = &sandbox.container_name {
            if let Err(err) = self.dispatcher.delete_executor(name).await {
                tracing::warn!(error = %err, sandbox_id, "terminate_sandbox: delete_executor failed, continuing");
            }
        }
        self.repo.delete_sandbox(sandbox_id).await?;
        Ok(())
    }

    /// §4.5.2: valid only from RUNNING.
    pub async fn pause_sandbox(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        let mut sandbox = self
            .repo
            .load_sandbox(sandbox_id)
            .await?
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
        if sandbox.status != SandboxStatus::Running {
            return Err(SandboxError::NotActive(sandbox_id.to_string(), sandbox.status.to_string()));
        }
        let name = sandbox
            .container_name
            .clone()
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
        self.dispatcher.pause_executor(&name).await?;
        sandbox
            .pause()
            .map_err(|e| SandboxError::InvalidTransition { from: "RUNNING".into(), event: e })?;
        self.repo.save_sandbox(&sandbox).await?;
        Ok(())
    }

    /// §4.5.2: valid only when `metadata.paused`.
    pub async fn resume_sandbox(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        let mut sandbox = self
            .repo
            .load_sandbox(sandbox_id)
            .await?
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
        if !sandbox.is_paused() {
            return Err(SandboxError::NotActive(sandbox_id.to_string(), sandbox.status.to_string()));
        }
        let name = sandbox
            .container_name
            .clone()
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
        self.dispatcher.unpause_executor(&name).await?;
        let base_url = self
            .dispatcher
            .get_container_address(&name)
            .await?
            .unwrap_or_default();
        sandbox
            .resume(base_url)
            .map_err(|e| SandboxError::InvalidTransition { from: "PENDING(paused)".into(), event: e })?;
        self.repo.save_sandbox(&sandbox).await?;
        Ok(())
    }

    /// §4.5.3.
    pub async fn keep_alive(&self, sandbox_id: &str, additional_secs: i64) -> Result<(), SandboxError> {
        let mut sandbox = self
            .repo
            .load_sandbox(sandbox_id)
            .await?
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
        if !sandbox.is_active() {
            return Err(SandboxError::NotActive(sandbox_id.to_string(), sandbox.status.to_string()));
        }
        sandbox.extend_expiry(additional_secs);
        self.repo.save_sandbox(&sandbox).await?;
        Ok(())
    }

    /// §4.5.4: create and persist an Execution; the caller is responsible
    /// for scheduling `run_execution` in the background (§4.5.5).
    pub async fn create_execution(
        &self,
        sandbox_id: &str,
        prompt: impl Into<String>,
        timeout_secs: Option<u64>,
        mut metadata: Map<String, Value>,
    ) -> Result<Execution, SandboxError> {
        let mut sandbox = self
            .repo
            .load_sandbox(sandbox_id)
            .await?
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
        if let Some(base_url) = sandbox.base_url.clone() {
            if !self.probe_health(&base_url).await {
                return Err(SandboxError::NotActive(sandbox_id.to_string(), sandbox.status.to_string()));
            }
        } else {
            return Err(SandboxError::NotActive(sandbox_id.to_string(), sandbox.status.to_string()));
        }
        let subtask_id = metadata
            .get("subtask_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(SandboxError::MissingTaskId)?;
        metadata
            .entry("task_id".to_string())
            .or_insert_with(|| Value::String(sandbox_id.to_string()));
        let timeout_secs = timeout_secs.unwrap_or(self.config.execution_timeout_secs);
        metadata.insert("timeout".to_string(), json!(timeout_secs));

        let execution = Execution::new(sandbox_id, &subtask_id, prompt.into()).with_metadata(metadata);
        self.repo.save_execution(&execution).await?;
        sandbox.touch();
        self.repo.save_sandbox(&sandbox).await?;
        Ok(execution)
    }

    /// §4.5.5: delegates to `execution_runner`, persisting at each hook.
    pub async fn run_execution(&self, sandbox: &Sandbox, mut execution: Execution) {
        let timeout_secs = execution
            .metadata
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(self.config.execution_timeout_secs);

        execution.mark_running();
        if let Err(err) = self.repo.save_execution(&execution).await {
            tracing::warn!(error = %err, execution_id = %execution.execution_id, "run_execution: failed to persist RUNNING state");
        }

        let result = execution_runner::send_execution_request(
            &self.http,
            sandbox.base_url.as_deref().unwrap_or_default(),
            &execution_runner::build_task_data(sandbox, &execution, timeout_secs, &self.callback_url),
            timeout_secs,
        )
        .await;

        match result {
            Ok(()) => {
                let mut sandbox = sandbox.clone();
                sandbox.touch();
                if let Err(err) = self.repo.save_sandbox(&sandbox).await {
                    tracing::warn!(error = %err, sandbox_id = %sandbox.sandbox_id, "run_execution: failed to touch sandbox");
                }
            }
            Err(err) => {
                self.fail_execution(&mut execution, &err).await;
            }
        }
    }

    async fn fail_execution(&self, execution: &mut Execution, err: &ExecutionError) {
        execution.set_failed(err.to_string());
        if let Err(save_err) = self.repo.save_execution(execution).await {
            tracing::warn!(error = %save_err, execution_id = %execution.execution_id, "fail_execution: failed to persist FAILED state");
        }
    }

    /// §4.5.6: numeric task_id first, then E2B-uuid fallback across the
    /// active set.
    pub async fn get_execution(&self, sandbox_id: &str, subtask_id: &str) -> Result<Option<Execution>, SandboxError> {
        if let Some(execution) = self.repo.load_execution(sandbox_id, subtask_id).await? {
            return Ok(Some(execution));
        }
        for id in self.repo.get_active_sandbox_ids().await? {
            if let Some(candidate) = self.repo.load_sandbox(&id).await? {
                if candidate.e2b_sandbox_id() == Some(sandbox_id) {
                    if let Some(task_id) = candidate.task_id() {
                        return self.repo.load_execution(task_id, subtask_id).await.map_err(Into::into);
                    }
                }
            }
        }
        Ok(None)
    }

    pub async fn list_executions(&self, sandbox_id: &str) -> Result<Vec<Execution>, SandboxError> {
        let direct = self.repo.list_executions(sandbox_id).await?;
        if !direct.is_empty() {
            return Ok(direct);
        }
        for id in self.repo.get_active_sandbox_ids().await? {
            if let Some(candidate) = self.repo.load_sandbox(&id).await? {
                if candidate.e2b_sandbox_id() == Some(sandbox_id) {
                    if let Some(task_id) = candidate.task_id() {
                        return self.repo.list_executions(task_id).await.map_err(Into::into);
                    }
                }
            }
        }
        Ok(Vec::new())
    }

    /// §4.5.7: sandbox-class heartbeat sweep for one candidate id, intended
    /// to be driven by `services::scheduler` under a distributed lock.
    pub async fn check_one_heartbeat(&self, sandbox_id: &str) {
        let Ok(Some(mut sandbox)) = self.repo.load_sandbox(sandbox_id).await else {
            return;
        };
        if sandbox.status != SandboxStatus::Running {
            return;
        }
        let alive = self
            .heartbeats
            .check_heartbeat(sandbox_id, HeartbeatKind::Sandbox, self.heartbeat_config.timeout_secs as i64)
            .await
            .unwrap_or(true);
        if alive {
            return;
        }
        let sandbox_age = chrono::Utc::now() - sandbox.created_at;
        if sandbox_age.num_seconds() <= self.heartbeat_config.grace_period_secs as i64 {
            return;
        }
        self.handle_executor_dead(&mut sandbox).await;
    }

    /// §4.5.7 `_handle_executor_dead`.
    async fn handle_executor_dead(&self, sandbox: &mut Sandbox) {
        for mut execution in self.repo.list_executions(&sandbox.sandbox_id).await.unwrap_or_default() {
            if execution.status == crate::domain::models::ExecutionStatus::Running {
                execution.set_failed("SubAgent crashed");
                if let Err(err) = self.repo.save_execution(&execution).await {
                    tracing::warn!(error = %err, execution_id = %execution.execution_id, "handle_executor_dead: failed to persist failed execution");
                }
            }
        }
        if let Err(err) = self.heartbeats.delete_heartbeat(&sandbox.sandbox_id, HeartbeatKind::Sandbox).await {
            tracing::warn!(error = %err, sandbox_id = %sandbox.sandbox_id, "handle_executor_dead: failed to delete heartbeat key");
        }
        sandbox.mark_failed("SubAgent crashed");
        if let Err(err) = self.repo.remove_from_active_set(&sandbox.sandbox_id).await {
            tracing::warn!(error = %err, sandbox_id = %sandbox.sandbox_id, "handle_executor_dead: failed to remove from active set");
        }
        if let Err(err) = self.repo.save_sandbox(sandbox).await {
            tracing::warn!(error = %err, sandbox_id = %sandbox.sandbox_id, "handle_executor_dead: failed to persist FAILED sandbox");
        }
        if let Some(name) = &sandbox.container_name {
            if let Err(err) = self.dispatcher.delete_executor(name).await {
                tracing::warn!(error = %err, sandbox_id = %sandbox.sandbox_id, "handle_executor_dead: best-effort delete_executor failed");
            }
        }
    }

    /// §4.5.9: one GC pass over already-fetched expired candidates.
    pub async fn collect_expired(&self, sandbox_ids: Vec<String>) {
        for id in sandbox_ids {
            match self.repo.load_sandbox(&id).await {
                Ok(Some(_)) => {
                    if let Err(err) = self.terminate_sandbox(&id).await {
                        tracing::warn!(error = %err, sandbox_id = %id, "collect_expired: terminate_sandbox failed, continuing");
                    }
                }
                Ok(None) => {
                    if let Err(err) = self.repo.remove_from_active_set(&id).await {
                        tracing::warn!(error = %err, sandbox_id = %id, "collect_expired: failed to remove orphaned active-set entry");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, sandbox_id = %id, "collect_expired: load_sandbox failed, continuing");
                }
            }
        }
    }
}
