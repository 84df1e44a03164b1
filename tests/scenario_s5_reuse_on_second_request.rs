//! A second `create_sandbox` call for the same task while the first
//! sandbox is still healthy must reuse it rather than submitting a new
//! container.

mod common;

use std::sync::Arc;

use serde_json::Map;
use wegent_control_plane::domain::models::{HeartbeatConfig, SandboxConfig, SandboxStatus, ShellType};
use wegent_control_plane::domain::ports::ExecutorDispatcher;
use wegent_control_plane::services::SandboxManager;

use common::{ConfigurableDispatcher, FakeHeartbeatStore, FakeSandboxRepository};

#[tokio::test]
async fn second_create_sandbox_reuses_the_healthy_container() {
    let mut server = mockito::Server::new_async().await;
    let health_mock = server.mock("GET", "/").with_status(200).with_body("ok").expect_at_least(2).create_async().await;

    let repo = Arc::new(FakeSandboxRepository::new());
    let dispatcher = Arc::new(ConfigurableDispatcher::new());
    dispatcher.set_next_address(server.url());
    let heartbeats = Arc::new(FakeHeartbeatStore::new());

    let manager = SandboxManager::new(
        repo,
        dispatcher.clone(),
        heartbeats,
        SandboxConfig { ready_timeout_secs: 5, ..SandboxConfig::default() },
        HeartbeatConfig::default(),
        "wegent/executor:test",
        "http://manager/callback",
    );

    let mut metadata = Map::new();
    metadata.insert("task_id".to_string(), serde_json::json!("600"));

    let first = manager
        .create_sandbox(ShellType::ClaudeCode, "u1", "alice", None, metadata.clone())
        .await
        .expect("first create_sandbox should succeed");
    assert_eq!(first.status, SandboxStatus::Running);
    assert_eq!(dispatcher.get_executor_count().await.unwrap(), 1);

    let second = manager
        .create_sandbox(ShellType::ClaudeCode, "u1", "alice", None, metadata)
        .await
        .expect("second create_sandbox should succeed by reusing the first");

    assert_eq!(second.sandbox_id, first.sandbox_id);
    assert_eq!(second.base_url, first.base_url);
    assert_eq!(dispatcher.get_executor_count().await.unwrap(), 1, "reuse must not submit a second container");

    health_mock.assert_async().await;
}
