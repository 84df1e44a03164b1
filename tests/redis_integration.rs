//! Round-trip tests against a real Redis instance.
//!
//! Require `REDIS_URL` (defaults to `redis://127.0.0.1:6379`) and a
//! reachable server, so they are `#[ignore]`d by default:
//!
//! ```bash
//! REDIS_URL=redis://127.0.0.1:6379 cargo test --test redis_integration -- --ignored
//! ```

use serde_json::Map;
use wegent_control_plane::adapters::redis::{RedisDistributedLock, RedisHeartbeatStore, RedisRunningTaskTracker, RedisSandboxRepository};
use wegent_control_plane::domain::models::{HeartbeatKind, Sandbox, ShellType, TaskMetadata};
use wegent_control_plane::domain::ports::{DistributedLock, HeartbeatStore, RunningTaskTracker, SandboxRepository};

async fn connect() -> redis::aio::ConnectionManager {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    wegent_control_plane::adapters::redis::connect(&url).await.expect("failed to connect to Redis")
}

#[tokio::test]
#[ignore]
async fn sandbox_round_trips_through_redis() {
    let conn = connect().await;
    let repo = RedisSandboxRepository::new(conn, 3600);

    let mut sandbox = Sandbox::new("it-sandbox-1", ShellType::ClaudeCode, "u1", "alice");
    sandbox.mark_running("http://127.0.0.1:9999").unwrap();

    assert!(repo.save_sandbox(&sandbox).await.unwrap());
    let loaded = repo.load_sandbox("it-sandbox-1").await.unwrap().expect("sandbox must be found");
    assert_eq!(loaded.sandbox_id, sandbox.sandbox_id);
    assert_eq!(loaded.base_url, sandbox.base_url);

    assert!(repo.get_active_sandbox_ids().await.unwrap().contains(&"it-sandbox-1".to_string()));

    repo.delete_sandbox("it-sandbox-1").await.unwrap();
    assert!(repo.load_sandbox("it-sandbox-1").await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn save_sandbox_without_task_id_is_rejected() {
    let conn = connect().await;
    let repo = RedisSandboxRepository::new(conn, 3600);

    let mut sandbox = Sandbox::new("it-sandbox-2", ShellType::ClaudeCode, "u1", "alice");
    sandbox.metadata = Map::new();

    assert!(!repo.save_sandbox(&sandbox).await.unwrap());
    assert!(repo.load_sandbox("it-sandbox-2").await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn heartbeat_expires_after_its_ttl() {
    let conn = connect().await;
    let store = RedisHeartbeatStore::new(conn, 1);

    store.update_heartbeat("it-hb-1", HeartbeatKind::Sandbox).await.unwrap();
    assert!(store.check_heartbeat("it-hb-1", HeartbeatKind::Sandbox, 30).await.unwrap());

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    assert!(store.get_last_heartbeat("it-hb-1", HeartbeatKind::Sandbox).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn running_task_tracker_round_trips() {
    let conn = connect().await;
    let tracker = RedisRunningTaskTracker::new(conn, 3600);

    let meta = TaskMetadata::new("it-task-1", Some("1".to_string()), "executor-it-1", None);
    tracker.add_running_task(&meta).await.unwrap();

    let ids = tracker.get_running_task_ids().await.unwrap();
    assert!(ids.contains(&"it-task-1".to_string()));

    let loaded = tracker.get_task_metadata("it-task-1").await.unwrap().expect("metadata must be found");
    assert_eq!(loaded.executor_name, "executor-it-1");

    tracker.remove_running_task("it-task-1").await.unwrap();
    assert!(tracker.get_task_metadata("it-task-1").await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn distributed_lock_is_exclusive_until_released() {
    let conn = connect().await;
    let lock = RedisDistributedLock::new(conn);

    assert!(lock.acquire("it-lock-1", 30).await.unwrap());
    assert!(!lock.acquire("it-lock-1", 30).await.unwrap(), "a second acquire must fail while the lock is held");

    lock.release("it-lock-1").await.unwrap();
    assert!(lock.acquire("it-lock-1", 30).await.unwrap(), "acquire must succeed again after release");
    lock.release("it-lock-1").await.unwrap();
}
