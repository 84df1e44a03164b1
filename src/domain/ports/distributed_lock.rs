//! Redis-backed mutex guarding periodic sweeps across manager replicas (§5).

use async_trait::async_trait;

use crate::domain::error::RepositoryError;

/// Acquired via `SET NX EX`; holders release explicitly, and expiration
/// bounds the damage if a holder crashes mid-sweep.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Returns `true` if the lock was acquired, `false` if already held.
    async fn acquire(&self, lock_name: &str, expire_secs: i64) -> Result<bool, RepositoryError>;

    async fn release(&self, lock_name: &str) -> Result<(), RepositoryError>;
}
