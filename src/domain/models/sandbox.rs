//! The `Sandbox` domain model and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::shell_type::ShellType;

/// Lifecycle status of a sandbox. `Pending` doubles as "paused" when
/// `metadata.paused == true` — see [`Sandbox::is_paused`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SandboxStatus {
    Pending,
    Running,
    Terminating,
    Terminated,
    Failed,
}

impl SandboxStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One isolated container serving a single task identity.
///
/// Invariants (enforced by callers, not representable in the type alone):
/// `sandbox_id == metadata.task_id` as a string; at most one row per
/// `task_id` in the repository; `base_url` is non-empty iff
/// `status == Running`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sandbox {
    pub sandbox_id: String,
    pub container_name: Option<String>,
    pub shell_type: ShellType,
    pub status: SandboxStatus,
    pub user_id: String,
    pub user_name: String,
    pub base_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub metadata: Map<String, Value>,
}

impl Sandbox {
    /// Construct a new PENDING sandbox for `task_id`.
    pub fn new(
        task_id: impl Into<String>,
        shell_type: ShellType,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        let task_id = task_id.into();
        let now = Utc::now();
        let mut metadata = Map::new();
        metadata.insert("task_id".to_string(), Value::String(task_id.clone()));
        Self {
            sandbox_id: task_id,
            container_name: None,
            shell_type,
            status: SandboxStatus::Pending,
            user_id: user_id.into(),
            user_name: user_name.into(),
            base_url: None,
            created_at: now,
            started_at: None,
            last_activity_at: now,
            expires_at: None,
            error_message: None,
            metadata,
        }
    }

    /// Merge extra metadata keys (`workspace_ref`, `bot_config`, ...) in place.
    #[must_use]
    pub fn with_metadata(mut self, extra: Map<String, Value>) -> Self {
        self.metadata.extend(extra);
        self
    }

    /// `metadata.task_id`, which must equal `sandbox_id` by construction.
    pub fn task_id(&self) -> Option<&str> {
        self.metadata.get("task_id").and_then(Value::as_str)
    }

    pub fn subtask_id(&self) -> Option<&str> {
        self.metadata.get("subtask_id").and_then(Value::as_str)
    }

    pub fn e2b_sandbox_id(&self) -> Option<&str> {
        self.metadata.get("e2b_sandbox_id").and_then(Value::as_str)
    }

    /// Whether the sandbox is paused (encoded as PENDING + `metadata.paused`).
    pub fn is_paused(&self) -> bool {
        self.status == SandboxStatus::Pending
            && self
                .metadata
                .get("paused")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    fn set_paused(&mut self, paused: bool) {
        if paused {
            self.metadata
                .insert("paused".to_string(), Value::Bool(true));
            self.metadata.insert(
                "paused_at".to_string(),
                Value::Number((Utc::now().timestamp()).into()),
            );
        } else {
            self.metadata.remove("paused");
            self.metadata.remove("paused_at");
        }
    }

    /// Terminal statuses never transition further.
    pub const fn is_terminal(&self) -> bool {
        matches!(self.status, SandboxStatus::Terminated | SandboxStatus::Failed)
    }

    /// Non-terminal: eligible for reuse probing in `create_sandbox`.
    pub const fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses reachable from the current one, accounting for the pause flag.
    fn valid_transitions(&self) -> &'static [SandboxStatus] {
        match (self.status, self.is_paused()) {
            (SandboxStatus::Pending, false) => &[
                SandboxStatus::Running,
                SandboxStatus::Failed,
                SandboxStatus::Terminating,
            ],
            (SandboxStatus::Pending, true) => {
                &[SandboxStatus::Running, SandboxStatus::Terminating, SandboxStatus::Failed]
            }
            (SandboxStatus::Running, _) => &[
                SandboxStatus::Failed,
                SandboxStatus::Pending,
                SandboxStatus::Terminating,
            ],
            (SandboxStatus::Terminating, _) => &[SandboxStatus::Terminated],
            (SandboxStatus::Terminated, _) | (SandboxStatus::Failed, _) => &[],
        }
    }

    pub fn can_transition_to(&self, target: SandboxStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Attempt a validated transition. `Running -> Pending` is used by
    /// `pause`; callers must set/clear the paused flag alongside.
    pub fn transition_to(&mut self, target: SandboxStatus) -> Result<(), String> {
        if !self.can_transition_to(target) {
            return Err(format!(
                "invalid sandbox transition from {} to {target} (paused={})",
                self.status,
                self.is_paused()
            ));
        }
        self.status = target;
        Ok(())
    }

    /// Transition into RUNNING with a resolved `base_url`.
    pub fn mark_running(&mut self, base_url: impl Into<String>) -> Result<(), String> {
        self.transition_to(SandboxStatus::Running)?;
        self.base_url = Some(base_url.into());
        self.started_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Transition into FAILED with a diagnostic message. Bypasses the
    /// normal transition check from any non-terminal state, the way the
    /// crash path must always be able to fail a sandbox regardless of
    /// its precise prior status.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.can_transition_to(SandboxStatus::Failed) {
            tracing::warn!(
                sandbox_id = %self.sandbox_id,
                from = %self.status,
                reason = %reason,
                "forcing sandbox into FAILED outside the normal transition table"
            );
        }
        self.status = SandboxStatus::Failed;
        self.error_message = Some(reason);
        self.base_url = None;
    }

    pub fn pause(&mut self) -> Result<(), String> {
        self.transition_to(SandboxStatus::Pending)?;
        self.set_paused(true);
        Ok(())
    }

    pub fn resume(&mut self, base_url: impl Into<String>) -> Result<(), String> {
        if !self.is_paused() {
            return Err("resume requires a paused sandbox".to_string());
        }
        self.transition_to(SandboxStatus::Running)?;
        self.set_paused(false);
        self.base_url = Some(base_url.into());
        Ok(())
    }

    pub fn begin_terminate(&mut self) -> Result<(), String> {
        self.transition_to(SandboxStatus::Terminating)
    }

    pub fn finish_terminate(&mut self) -> Result<(), String> {
        self.transition_to(SandboxStatus::Terminated)
    }

    /// Refresh `last_activity_at` to now.
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Extend `expires_at` by `additional` seconds from its current value
    /// (or from now if unset).
    pub fn extend_expiry(&mut self, additional_secs: i64) {
        let base = self.expires_at.unwrap_or_else(Utc::now);
        self.expires_at = Some(base + chrono::Duration::seconds(additional_secs));
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Sandbox {
        Sandbox::new("100", ShellType::ClaudeCode, "1", "u")
    }

    #[test]
    fn sandbox_id_matches_task_id() {
        let s = fresh();
        assert_eq!(s.sandbox_id, "100");
        assert_eq!(s.task_id(), Some("100"));
    }

    #[test]
    fn pending_to_running_sets_base_url() {
        let mut s = fresh();
        s.mark_running("http://10.0.0.1:8080").unwrap();
        assert_eq!(s.status, SandboxStatus::Running);
        assert_eq!(s.base_url.as_deref(), Some("http://10.0.0.1:8080"));
    }

    #[test]
    fn pause_then_resume_round_trips() {
        let mut s = fresh();
        s.mark_running("http://x").unwrap();
        s.pause().unwrap();
        assert!(s.is_paused());
        assert_eq!(s.status, SandboxStatus::Pending);
        s.resume("http://x").unwrap();
        assert!(!s.is_paused());
        assert_eq!(s.status, SandboxStatus::Running);
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut s = fresh();
        s.mark_failed("boom");
        assert!(s.is_terminal());
        assert!(!s.can_transition_to(SandboxStatus::Running));
        assert!(s.transition_to(SandboxStatus::Running).is_err());
    }

    #[test]
    fn terminate_sequence() {
        let mut s = fresh();
        s.mark_running("http://x").unwrap();
        s.begin_terminate().unwrap();
        assert_eq!(s.status, SandboxStatus::Terminating);
        s.finish_terminate().unwrap();
        assert_eq!(s.status, SandboxStatus::Terminated);
        assert!(s.is_terminal());
    }

    #[test]
    fn crash_from_any_nonterminal_state_is_failed() {
        let mut s = fresh();
        s.mark_failed("SubAgent crashed");
        assert_eq!(s.status, SandboxStatus::Failed);
        assert_eq!(s.error_message.as_deref(), Some("SubAgent crashed"));
        assert!(s.base_url.is_none());
    }

    #[test]
    fn extend_expiry_from_unset() {
        let mut s = fresh();
        assert!(s.expires_at.is_none());
        s.extend_expiry(600);
        assert!(s.expires_at.is_some());
    }

    #[test]
    fn resume_without_pause_is_rejected() {
        let mut s = fresh();
        s.mark_running("http://x").unwrap();
        assert!(s.resume("http://x").is_err());
    }
}
