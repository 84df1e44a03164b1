//! Sandbox/execution persistence port.

use async_trait::async_trait;

use crate::domain::error::RepositoryError;
use crate::domain::models::{Execution, Sandbox};

/// Sole entry point for sandbox/execution persistence (§4.1). Every
/// method degrades to a logged `Ok(None)`/`Ok(false)`/`Ok(vec![])` on a
/// transport failure rather than propagating — callers treat a failed
/// read as "not found" and a failed write as "accepted but volatile" (§7).
#[async_trait]
pub trait SandboxRepository: Send + Sync {
    /// Writes `__sandbox__`, refreshes the session hash TTL, and upserts
    /// the active-set ZSet. Returns `Ok(false)` without writing if
    /// `metadata.task_id` is absent.
    async fn save_sandbox(&self, sandbox: &Sandbox) -> Result<bool, RepositoryError>;

    async fn load_sandbox(&self, sandbox_id: &str) -> Result<Option<Sandbox>, RepositoryError>;

    /// Removes the active-set member and deletes the entire session hash.
    async fn delete_sandbox(&self, sandbox_id: &str) -> Result<(), RepositoryError>;

    async fn get_active_sandbox_ids(&self) -> Result<Vec<String>, RepositoryError>;

    /// `ZRANGEBYSCORE 0 (now - max_age)`.
    async fn get_expired_sandbox_ids(&self, max_age_secs: i64) -> Result<Vec<String>, RepositoryError>;

    async fn remove_from_active_set(&self, sandbox_id: &str) -> Result<(), RepositoryError>;

    async fn update_activity_timestamp(&self, sandbox_id: &str) -> Result<(), RepositoryError>;

    async fn save_execution(&self, execution: &Execution) -> Result<bool, RepositoryError>;

    async fn load_execution(
        &self,
        sandbox_id: &str,
        subtask_id: &str,
    ) -> Result<Option<Execution>, RepositoryError>;

    /// Skips the reserved `__sandbox__` field; any value that fails to
    /// parse is skipped and logged rather than failing the whole call.
    async fn list_executions(&self, sandbox_id: &str) -> Result<Vec<Execution>, RepositoryError>;

    async fn save_executor_binding(
        &self,
        task_id: &str,
        executor_name: &str,
        ttl_secs: i64,
    ) -> Result<(), RepositoryError>;

    async fn load_executor_binding(&self, task_id: &str) -> Result<Option<String>, RepositoryError>;
}
