//! Redis-backed adapters for the domain ports.
//!
//! All cross-process mutable state lives in Redis (§5); each adapter here
//! owns exactly one key namespace, matching the "only X writes Y" policy
//! in §5's Shared-resource policy paragraph.

pub mod distributed_lock;
pub mod heartbeat_store;
pub mod running_task_tracker;
pub mod sandbox_repository;

pub use distributed_lock::RedisDistributedLock;
pub use heartbeat_store::RedisHeartbeatStore;
pub use running_task_tracker::RedisRunningTaskTracker;
pub use sandbox_repository::RedisSandboxRepository;

use redis::aio::ConnectionManager;

/// Build a shared, auto-reconnecting connection manager. Cloning is cheap
/// and safe across tasks (`ConnectionManager` multiplexes internally).
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let client = redis::Client::open(redis_url)?;
    client.get_connection_manager().await
}
