//! Manager-side callback dispatch, `POST {prefix}/callback` (§4.8).
//!
//! Routes by `task_type`: `validation` forwards to the back-end validation
//! endpoint and never touches the task DB; `sandbox` resolves and updates
//! the owning `Execution`; anything else forwards to the back-end task API
//! and, on a terminal status, removes the task from `RunningTaskTracker`.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::error::{CallbackError, RepositoryError};
use crate::domain::models::{CallbackPayload, TaskType};
use crate::domain::ports::{
    BackendClient, BackendTaskStatus, RunningTaskTracker, SandboxRepository, ValidationStatus, ValidationStatusUpdate,
};

pub struct CallbackHandler<R, T, B>
where
    R: SandboxRepository,
    T: RunningTaskTracker,
    B: BackendClient,
{
    repo: Arc<R>,
    tracker: Arc<T>,
    backend: Arc<B>,
}

impl<R, T, B> CallbackHandler<R, T, B>
where
    R: SandboxRepository,
    T: RunningTaskTracker,
    B: BackendClient,
{
    pub fn new(repo: Arc<R>, tracker: Arc<T>, backend: Arc<B>) -> Self {
        Self { repo, tracker, backend }
    }

    pub async fn handle(&self, payload: CallbackPayload) -> Result<(), CallbackError> {
        match TaskType::from_wire(payload.task_type.as_deref()) {
            TaskType::Validation => self.handle_validation(payload).await,
            TaskType::Sandbox => self.handle_sandbox(payload).await,
            TaskType::Regular => self.handle_regular(payload).await,
        }
    }

    /// Validation tasks never update the task DB — only forwarded to the
    /// back-end's dedicated validation endpoint, keyed by `validation_id`
    /// (carried inside `result`, not `task_id`). Without a `validation_id`
    /// there is nothing to forward to, so the callback is dropped with a
    /// warning, matching the original's behavior on an early failure with
    /// no result yet.
    async fn handle_validation(&self, payload: CallbackPayload) -> Result<(), CallbackError> {
        let Some(validation_id) = payload.result.as_ref().and_then(|r| r.get("validation_id")).and_then(Value::as_str) else {
            tracing::warn!(task_id = %payload.task_id, "handle_validation: no validation_id in result, skipping forward");
            return Ok(());
        };

        let status_lower = payload.status.as_deref().unwrap_or_default().to_lowercase();
        let status = match status_lower.as_str() {
            "completed" | "failed" => ValidationStatus::Completed,
            _ => ValidationStatus::RunningChecks,
        };

        let validation_result = payload.result.as_ref().and_then(|r| r.get("validation_result"));
        let mut valid = validation_result.and_then(|r| r.get("valid")).and_then(Value::as_bool);
        if status_lower == "failed" && valid.is_none() {
            valid = Some(false);
        }
        let stage = payload
            .result
            .as_ref()
            .and_then(|r| r.get("stage"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some("Running checks".to_string()));
        let checks = validation_result.and_then(|r| r.get("checks")).cloned();
        let errors = validation_result.and_then(|r| r.get("errors")).cloned();

        self.backend
            .update_validation_status(ValidationStatusUpdate {
                validation_id: validation_id.to_string(),
                status,
                stage,
                progress: payload.progress,
                valid,
                checks,
                errors,
                error_message: payload.error_message.clone(),
                executor_name: payload.executor_name.clone(),
            })
            .await
    }

    /// Sandbox tasks resolve the owning `Execution` by `(task_id, subtask_id)`
    /// and apply the callback's progress/terminal status directly, bypassing
    /// the back-end entirely.
    async fn handle_sandbox(&self, payload: CallbackPayload) -> Result<(), CallbackError> {
        let mut execution = match self.repo.load_execution(&payload.task_id, &payload.subtask_id).await {
            Ok(Some(execution)) => execution,
            Ok(None) => {
                tracing::warn!(task_id = %payload.task_id, subtask_id = %payload.subtask_id, "handle_sandbox: no execution found for callback");
                return Ok(());
            }
            Err(err) => return Err(repository_to_callback(err)),
        };

        match payload.status.as_deref() {
            Some("RUNNING") | None => execution.set_progress(payload.progress),
            Some("COMPLETED") => {
                let result = payload.result.clone().unwrap_or(Value::Null);
                let silent = result.get("silent_exit").and_then(Value::as_bool).unwrap_or(false);
                if silent {
                    let reason = result
                        .get("silent_exit_reason")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    execution.set_completed_silent(result_value_to_string(&result), reason);
                } else {
                    execution.set_completed(result_value_to_string(&result));
                }
            }
            Some("FAILED") => {
                execution.set_failed(payload.error_message.clone().unwrap_or_else(|| "execution failed".to_string()));
            }
            Some("CANCELLED") => {
                execution.set_cancelled();
            }
            Some(other) => {
                tracing::warn!(status = other, "handle_sandbox: unrecognized callback status, ignoring");
            }
        }

        self.repo
            .save_execution(&execution)
            .await
            .map_err(repository_to_callback)?;

        if let Some(extra) = payload.sandbox_metadata {
            match self.repo.load_sandbox(&payload.task_id).await {
                Ok(Some(sandbox)) => {
                    let sandbox = sandbox.with_metadata(extra);
                    if let Err(err) = self.repo.save_sandbox(&sandbox).await {
                        tracing::warn!(error = %err, task_id = %payload.task_id, "handle_sandbox: failed to persist sandbox_metadata");
                    }
                }
                Ok(None) => {
                    tracing::warn!(task_id = %payload.task_id, "handle_sandbox: no sandbox found to apply sandbox_metadata to");
                }
                Err(err) => return Err(repository_to_callback(err)),
            }
        }
        Ok(())
    }

    /// Regular (non-sandbox) tasks forward verbatim to the back-end task
    /// API; a terminal status retires the task from `RunningTaskTracker`.
    async fn handle_regular(&self, payload: CallbackPayload) -> Result<(), CallbackError> {
        let status = match payload.status.as_deref() {
            Some("RUNNING") => BackendTaskStatus::Running,
            Some("COMPLETED") | Some("SUCCESS") => BackendTaskStatus::Completed,
            Some("FAILED") => BackendTaskStatus::Failed,
            Some("CANCELLED") => BackendTaskStatus::Cancelled,
            _ => BackendTaskStatus::Pending,
        };
        self.backend
            .update_task_status(
                &payload.task_id,
                status,
                payload.error_message.as_deref(),
                payload.result.clone(),
                payload.executor_name.as_deref(),
            )
            .await?;

        if status.is_terminal() {
            if let Err(err) = self.tracker.remove_running_task(&payload.task_id).await {
                tracing::warn!(error = %err, task_id = %payload.task_id, "handle_regular: failed to remove running task on terminal callback");
            }
        }
        Ok(())
    }
}

fn repository_to_callback(err: RepositoryError) -> CallbackError {
    CallbackError::RetriesExhausted(err.to_string())
}

fn result_value_to_string(value: &Value) -> String {
    match value.get("value").and_then(Value::as_str) {
        Some(s) => s.to_string(),
        None if value.is_null() => String::new(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_value_prefers_value_field() {
        let v = serde_json::json!({"value": "ok", "other": 1});
        assert_eq!(result_value_to_string(&v), "ok");
    }

    #[test]
    fn result_value_falls_back_to_raw_json() {
        let v = serde_json::json!({"other": 1});
        assert_eq!(result_value_to_string(&v), v.to_string());
    }
}
