//! Builds the per-execution RPC payload and drives the container request
//! (§4.6). Runs once per execution; the streaming work it kicks off lives
//! inside the container and is out of this process's scope except for the
//! callbacks it receives later via `callback_handler`.

use std::time::Duration;

use serde_json::{json, Value};

use crate::domain::error::ExecutionError;
use crate::domain::models::{Execution, Sandbox};

/// HTTP request cap independent of the execution's own timeout; the
/// effective cap is `min(this, execution.timeout)`.
pub const HTTP_EXECUTION_REQUEST_SECS: u64 = 60;

/// Builds the JSON payload POSTed to the container's execute endpoint.
pub fn build_task_data(sandbox: &Sandbox, execution: &Execution, timeout_secs: u64, callback_url: &str) -> Value {
    let bot = execution
        .metadata
        .get("bot")
        .cloned()
        .unwrap_or_else(|| json!([{ "shell_type": sandbox.shell_type.as_str() }]));

    json!({
        "task_id": execution.metadata.get("task_id"),
        "subtask_id": execution.metadata.get("subtask_id"),
        "task_title": execution.metadata.get("task_title"),
        "subtask_title": execution.execution_id,
        "type": "sandbox",
        "prompt": execution.prompt,
        "bot": bot,
        "user_id": sandbox.user_id,
        "user_name": sandbox.user_name,
        "callback_url": callback_url,
        "metadata": execution.metadata,
        "timeout": timeout_secs,
    })
}

/// Effective HTTP timeout for the execute call: the shorter of the
/// process-wide request cap and the execution's own timeout (§5 Timeouts).
pub fn effective_request_timeout(timeout_secs: u64) -> Duration {
    Duration::from_secs(timeout_secs.min(HTTP_EXECUTION_REQUEST_SECS))
}

/// POST the execute request to the container and interpret the response.
/// A 200 means the container *accepted* the work; actual execution runs
/// inside it and reports back via callback.
pub async fn send_execution_request(
    client: &reqwest::Client,
    base_url: &str,
    task_data: &Value,
    timeout_secs: u64,
) -> Result<(), ExecutionError> {
    let url = format!("{}/api/tasks/execute", base_url.trim_end_matches('/'));
    let response = client
        .post(&url)
        .json(task_data)
        .timeout(effective_request_timeout(timeout_secs))
        .send()
        .await
        .map_err(|err| {
            if err.is_timeout() {
                ExecutionError::Timeout
            } else {
                ExecutionError::ConnectionFailed
            }
        })?;

    if response.status().is_success() {
        return Ok(());
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ExecutionError::RejectedByExecutor { status, body })
}

/// Drives a single execution attempt: marks it running, sends the request,
/// and invokes the caller's completion/error hooks. Callers supply async
/// closures rather than this function owning persistence so `SandboxManager`
/// can wire its own `save_execution`/`save_sandbox` side effects (§4.5.5).
pub async fn run_with_timeout<OnRunning, OnComplete, OnError, FutR, FutC, FutE>(
    client: &reqwest::Client,
    sandbox: &Sandbox,
    execution: &Execution,
    timeout_secs: u64,
    callback_url: &str,
    on_running: OnRunning,
    on_complete: OnComplete,
    on_error: OnError,
) where
    OnRunning: FnOnce() -> FutR,
    OnComplete: FnOnce() -> FutC,
    OnError: FnOnce(ExecutionError) -> FutE,
    FutR: std::future::Future<Output = ()>,
    FutC: std::future::Future<Output = ()>,
    FutE: std::future::Future<Output = ()>,
{
    on_running().await;
    let task_data = build_task_data(sandbox, execution, timeout_secs, callback_url);
    match send_execution_request(client, sandbox.base_url.as_deref().unwrap_or_default(), &task_data, timeout_secs).await {
        Ok(()) => on_complete().await,
        Err(err) => on_error(err).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ShellType;

    fn sample_sandbox() -> Sandbox {
        Sandbox::new("100", ShellType::ClaudeCode, "u1", "alice")
    }

    fn sample_execution() -> Execution {
        let mut meta = serde_json::Map::new();
        meta.insert("task_id".to_string(), json!("100"));
        Execution::new("100", "1", "hello").with_metadata(meta)
    }

    #[test]
    fn build_task_data_defaults_bot_to_shell_type() {
        let sandbox = sample_sandbox();
        let execution = sample_execution();
        let payload = build_task_data(&sandbox, &execution, 600, "http://manager/callback");
        assert_eq!(payload["type"], "sandbox");
        assert_eq!(payload["bot"][0]["shell_type"], "claudecode");
        assert_eq!(payload["subtask_title"], execution.execution_id);
    }

    #[test]
    fn effective_timeout_is_the_shorter_of_the_two() {
        assert_eq!(effective_request_timeout(30), Duration::from_secs(30));
        assert_eq!(effective_request_timeout(600), Duration::from_secs(HTTP_EXECUTION_REQUEST_SECS));
    }
}
