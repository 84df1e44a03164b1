//! End-to-end happy path: create a sandbox against a live (mocked) executor,
//! start an execution, and confirm the manager reports it as accepted.

mod common;

use std::sync::Arc;

use serde_json::Map;
use wegent_control_plane::domain::models::{HeartbeatConfig, SandboxConfig, SandboxStatus, ShellType};
use wegent_control_plane::services::SandboxManager;

use common::{ConfigurableDispatcher, FakeHeartbeatStore, FakeSandboxRepository};

#[tokio::test]
async fn create_sandbox_then_create_execution_reaches_running() {
    let mut server = mockito::Server::new_async().await;
    let health_mock = server.mock("GET", "/").with_status(200).with_body("ok").expect_at_least(1).create_async().await;
    let execute_mock = server
        .mock("POST", "/api/tasks/execute")
        .with_status(200)
        .with_body(serde_json::json!({ "accepted": true }).to_string())
        .create_async()
        .await;

    let repo = Arc::new(FakeSandboxRepository::new());
    let dispatcher = Arc::new(ConfigurableDispatcher::new());
    dispatcher.set_next_address(server.url());
    let heartbeats = Arc::new(FakeHeartbeatStore::new());

    let manager = SandboxManager::new(
        repo,
        dispatcher,
        heartbeats,
        SandboxConfig { ready_timeout_secs: 5, ..SandboxConfig::default() },
        HeartbeatConfig::default(),
        "wegent/executor:test",
        "http://manager/callback",
    );

    let mut metadata = Map::new();
    metadata.insert("task_id".to_string(), serde_json::json!("500"));
    let sandbox = manager
        .create_sandbox(ShellType::ClaudeCode, "u1", "alice", None, metadata)
        .await
        .expect("create_sandbox should succeed against a healthy mock executor");

    assert_eq!(sandbox.status, SandboxStatus::Running);
    assert!(sandbox.base_url.is_some());

    let mut exec_metadata = Map::new();
    exec_metadata.insert("subtask_id".to_string(), serde_json::json!("1"));
    let execution = manager
        .create_execution(&sandbox.sandbox_id, "do the thing", None, exec_metadata)
        .await
        .expect("create_execution should succeed for a running sandbox");

    manager.run_execution(&sandbox, execution.clone()).await;

    let stored = manager
        .get_execution(&sandbox.sandbox_id, "1")
        .await
        .unwrap()
        .expect("execution should be persisted");
    assert_eq!(stored.execution_id, execution.execution_id);

    health_mock.assert_async().await;
    execute_mock.assert_async().await;
}
