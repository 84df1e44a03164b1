//! Live non-sandbox task tracking port (§4.3).

use async_trait::async_trait;

use crate::domain::error::RepositoryError;
use crate::domain::models::TaskMetadata;

#[async_trait]
pub trait RunningTaskTracker: Send + Sync {
    /// `ZADD` plus a metadata hash write with a long safety TTL (default 7d).
    async fn add_running_task(&self, meta: &TaskMetadata) -> Result<(), RepositoryError>;

    /// Called on terminal callback arrival, executor deletion, cancel, and
    /// the crash path. Idempotent: a second call on an absent task is a no-op.
    async fn remove_running_task(&self, task_id: &str) -> Result<(), RepositoryError>;

    async fn get_running_task_ids(&self) -> Result<Vec<String>, RepositoryError>;

    async fn get_task_metadata(&self, task_id: &str) -> Result<Option<TaskMetadata>, RepositoryError>;

    /// `ZRANGEBYSCORE -inf (now - max_age)`.
    async fn get_stale_tasks(&self, max_age_secs: i64) -> Result<Vec<TaskMetadata>, RepositoryError>;
}
