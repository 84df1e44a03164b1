//! Heartbeat key read/write port (§4.2).

use async_trait::async_trait;

use crate::domain::error::HeartbeatError;
use crate::domain::models::HeartbeatKind;

/// Minimal typed wrapper over the two heartbeat key classes. Note:
/// `check_heartbeat` conflates "never heartbeated" with "timed out" — the
/// sweepers in `services::scheduler` disambiguate using a separate grace
/// period anchored to sandbox/task creation time (§4.5).
#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    /// `SETEX` with the configured key TTL, value = current Unix seconds.
    async fn update_heartbeat(&self, id: &str, kind: HeartbeatKind) -> Result<(), HeartbeatError>;

    /// `false` if missing or if `now - value >= timeout_secs`.
    async fn check_heartbeat(
        &self,
        id: &str,
        kind: HeartbeatKind,
        timeout_secs: i64,
    ) -> Result<bool, HeartbeatError>;

    /// May return `None` if the key has already expired.
    async fn get_last_heartbeat(&self, id: &str, kind: HeartbeatKind) -> Result<Option<i64>, HeartbeatError>;

    async fn delete_heartbeat(&self, id: &str, kind: HeartbeatKind) -> Result<(), HeartbeatError>;
}
