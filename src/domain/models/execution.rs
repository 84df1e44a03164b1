//! The `Execution` domain model: one attempt to run a prompt inside a sandbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt to run a prompt inside a `Sandbox`, identified per-sandbox
/// by `subtask_id`. Terminal statuses are absorbing: once set, no later
/// save may change `status` (enforced by [`Execution::apply_terminal`]
/// and by callers checking [`Execution::is_terminal`] before writing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub sandbox_id: String,
    pub prompt: String,
    pub status: ExecutionStatus,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub silent_exit: bool,
    pub silent_exit_reason: Option<String>,
    pub metadata: Map<String, Value>,
}

impl Execution {
    pub fn new(sandbox_id: impl Into<String>, subtask_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        let subtask_id = subtask_id.into();
        let mut metadata = Map::new();
        metadata.insert("subtask_id".to_string(), Value::String(subtask_id.clone()));
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            sandbox_id: sandbox_id.into(),
            prompt: prompt.into(),
            status: ExecutionStatus::Pending,
            result: None,
            error_message: None,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            silent_exit: false,
            silent_exit_reason: None,
            metadata,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, extra: Map<String, Value>) -> Self {
        self.metadata.extend(extra);
        self
    }

    pub fn subtask_id(&self) -> Option<&str> {
        self.metadata.get("subtask_id").and_then(Value::as_str)
    }

    pub fn task_id(&self) -> Option<&str> {
        self.metadata.get("task_id").and_then(Value::as_str)
    }

    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `status == Running`, set before the execution RPC is dispatched.
    pub fn mark_running(&mut self) {
        debug_assert!(!self.is_terminal(), "cannot re-start a terminal execution");
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Apply a terminal status. A no-op (logged) if already terminal,
    /// enforcing the "terminal is absorbing" invariant (§8).
    fn apply_terminal(&mut self, status: ExecutionStatus) -> bool {
        if self.is_terminal() {
            tracing::debug!(
                execution_id = %self.execution_id,
                existing = %self.status,
                attempted = %status,
                "ignoring terminal overwrite of an already-terminal execution"
            );
            return false;
        }
        self.status = status;
        self.progress = 100;
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn set_completed(&mut self, result: impl Into<String>) -> bool {
        let applied = self.apply_terminal(ExecutionStatus::Completed);
        if applied {
            self.result = Some(result.into());
        }
        applied
    }

    /// Mark completed with the silent-exit signal carried through, per
    /// the silent-exit contract: the execution is COMPLETED but hidden
    /// from default timelines by the back-end.
    pub fn set_completed_silent(&mut self, result: impl Into<String>, reason: impl Into<String>) -> bool {
        let applied = self.set_completed(result);
        if applied {
            self.silent_exit = true;
            self.silent_exit_reason = Some(reason.into());
        }
        applied
    }

    pub fn set_failed(&mut self, error_message: impl Into<String>) -> bool {
        let applied = self.apply_terminal(ExecutionStatus::Failed);
        if applied {
            self.error_message = Some(error_message.into());
        }
        applied
    }

    /// Cancellation never surfaces as FAILED: terminal status is COMPLETED
    /// with an observable cancelled signal (§7).
    pub fn set_cancelled(&mut self) -> bool {
        self.apply_terminal(ExecutionStatus::Cancelled)
    }

    pub fn set_progress(&mut self, progress: u8) {
        if !self.is_terminal() {
            self.progress = progress.min(99);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Execution {
        Execution::new("100", "1", "hi")
    }

    #[test]
    fn starts_pending_with_zero_progress() {
        let e = fresh();
        assert_eq!(e.status, ExecutionStatus::Pending);
        assert_eq!(e.progress, 0);
    }

    #[test]
    fn completed_sets_progress_100() {
        let mut e = fresh();
        e.mark_running();
        assert!(e.set_completed("ok"));
        assert_eq!(e.progress, 100);
        assert_eq!(e.result.as_deref(), Some("ok"));
        assert!(e.is_terminal());
    }

    #[test]
    fn terminal_is_absorbing() {
        let mut e = fresh();
        e.mark_running();
        assert!(e.set_completed("ok"));
        assert!(!e.set_failed("too late"));
        assert_eq!(e.status, ExecutionStatus::Completed);
        assert_eq!(e.result.as_deref(), Some("ok"));
    }

    #[test]
    fn silent_exit_carries_reason() {
        let mut e = fresh();
        e.mark_running();
        assert!(e.set_completed_silent("", "nothing to report"));
        assert!(e.silent_exit);
        assert_eq!(e.silent_exit_reason.as_deref(), Some("nothing to report"));
    }

    #[test]
    fn cancellation_is_completed_not_failed() {
        let mut e = fresh();
        e.mark_running();
        assert!(e.set_cancelled());
        assert_eq!(e.status, ExecutionStatus::Cancelled);
    }

    #[test]
    fn progress_is_clamped_below_terminal() {
        let mut e = fresh();
        e.set_progress(250);
        assert_eq!(e.progress, 99);
    }
}
