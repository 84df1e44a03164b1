//! The back-end task API, consumed only by the crash-forensics path
//! (§4.5.8) and the validation callback forwarder (§4.8). Out of scope
//! as an HTTP surface (§1) — only the contract the core depends on.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::CallbackError;
use crate::domain::models::ExecutionStatus;

/// Terminal/non-terminal task status as reported by the back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BackendTaskStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl From<ExecutionStatus> for BackendTaskStatus {
    fn from(value: ExecutionStatus) -> Self {
        match value {
            ExecutionStatus::Pending => Self::Pending,
            ExecutionStatus::Running => Self::Running,
            ExecutionStatus::Completed => Self::Completed,
            ExecutionStatus::Failed => Self::Failed,
            ExecutionStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// Validation-task status, a vocabulary distinct from `BackendTaskStatus`:
/// the back-end's validation endpoint speaks `running_checks`/`completed`,
/// never the regular task API's `RUNNING`/`COMPLETED`/`FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    RunningChecks,
    Completed,
}

/// Wire body for the back-end's validation-status endpoint
/// (`/api/shells/validation-status/{validation_id}`), bundled into a
/// struct since it carries more fields than the regular task-status call.
#[derive(Debug, Clone)]
pub struct ValidationStatusUpdate {
    pub validation_id: String,
    pub status: ValidationStatus,
    pub stage: Option<String>,
    pub progress: u8,
    pub valid: Option<bool>,
    pub checks: Option<Value>,
    pub errors: Option<Value>,
    pub error_message: Option<String>,
    pub executor_name: Option<String>,
}

/// The back-end task API as consumed by the crash path and the
/// regular/validation callback forwarders.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn get_task_status(&self, task_id: &str) -> Result<Option<BackendTaskStatus>, CallbackError>;

    /// Used by `_handle_task_dead` to push a FAILED status with a
    /// diagnostic message, and by the regular-task callback forwarder.
    async fn update_task_status(
        &self,
        task_id: &str,
        status: BackendTaskStatus,
        error_message: Option<&str>,
        result: Option<Value>,
        executor_name: Option<&str>,
    ) -> Result<(), CallbackError>;

    /// Forwards a validation-task callback to the back-end's dedicated
    /// validation endpoint, a different route and wire vocabulary than
    /// `update_task_status`.
    async fn update_validation_status(&self, update: ValidationStatusUpdate) -> Result<(), CallbackError>;
}
