//! Container driver contract consumed by `SandboxManager` (§4.4).
//!
//! Implementations (e.g. a Docker driver) are deliberately out of scope
//! (§1): Docker-binary extraction, port allocation heuristics, and
//! container naming schemes are not specified here. The core ships the
//! trait plus an in-memory fake for exercising the manager and scheduler
//! without a real container runtime.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::DispatcherError;

/// Result of a container status probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub exists: bool,
    /// One of `running`, `exited`, `paused`, ... — driver-defined.
    pub status: String,
    pub oom_killed: bool,
    /// `0` = clean exit, `137` = SIGKILL (the canonical OOM-kill code).
    pub exit_code: Option<i32>,
    pub error_msg: Option<String>,
}

impl ContainerStatus {
    pub fn is_running_status(&self) -> bool {
        self.exists && self.status == "running"
    }
}

/// Outcome of submitting a task to the dispatcher.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub executor_name: Option<String>,
    pub error_msg: Option<String>,
}

/// Container driver contract consumed by `SandboxManager`.
#[async_trait]
pub trait ExecutorDispatcher: Send + Sync {
    /// Submit a task payload (the `task_data` built in §4.5.1/§4.6) for
    /// execution, returning the driver-assigned executor name on success.
    async fn submit_executor(
        &self,
        task_data: Value,
        callback_url: Option<&str>,
    ) -> Result<SubmitOutcome, DispatcherError>;

    /// Stop and remove the named executor. Callers treat failures here as
    /// best-effort: logged, never surfaced as a hard error (§4.5.2, §4.5.7).
    async fn delete_executor(&self, executor_name: &str) -> Result<(), DispatcherError>;

    /// Forward a cancellation signal into the running container so it can
    /// stop the in-flight agent loop, ahead of the Redis-side cleanup
    /// (§6.2's `/tasks/cancel`). Best-effort like `delete_executor`: a
    /// container that is already gone is not an error.
    async fn cancel_executor(&self, executor_name: &str) -> Result<(), DispatcherError>;

    async fn pause_executor(&self, executor_name: &str) -> Result<(), DispatcherError>;

    async fn unpause_executor(&self, executor_name: &str) -> Result<(), DispatcherError>;

    async fn get_container_address(&self, executor_name: &str) -> Result<Option<String>, DispatcherError>;

    async fn get_container_status(&self, executor_name: &str) -> Result<ContainerStatus, DispatcherError>;

    async fn get_executor_count(&self) -> Result<u32, DispatcherError>;

    async fn get_executor_task_id(&self, executor_name: &str) -> Result<Option<String>, DispatcherError>;
}
