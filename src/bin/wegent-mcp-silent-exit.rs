//! MCP server exposing the `silent_exit` tool over stdio, for agent engines
//! (e.g. Claude via MCP) that cannot natively emit the `__silent_exit__`
//! marker object `response_processor` looks for directly.
//!
//! # Usage
//!
//! ```bash
//! wegent-mcp-silent-exit
//! ```

use anyhow::{Context, Result};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::ServerInfo;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use wegent_control_plane::domain::models::{CallbackConfig, CallbackPayload};
use wegent_control_plane::services::callback_client::CallbackClient;
use wegent_control_plane::services::silent_exit::{build_marker, SilentExitArgs};

/// The task context a sandbox container is launched with, read from the
/// `TASK_INFO` environment variable (one JSON blob, set by the dispatcher
/// at submit time).
#[derive(Debug, Clone, Default, Deserialize)]
struct TaskInfo {
    task_id: Option<String>,
    subtask_id: Option<String>,
    task_title: Option<String>,
    #[serde(rename = "type")]
    task_type: Option<String>,
}

fn task_info_from_env() -> Option<TaskInfo> {
    let raw = std::env::var("TASK_INFO").ok()?;
    match serde_json::from_str(&raw) {
        Ok(info) => Some(info),
        Err(err) => {
            warn!(error = %err, "failed to parse TASK_INFO environment variable");
            None
        }
    }
}

/// Independently reports a silent exit to the manager, so the execution's
/// status can still be inferred if the marker is stripped out of the tool
/// result before `response_processor` ever sees it. Best-effort: any
/// missing context or send failure is logged, never surfaced to the MCP
/// caller — the marker return value is the primary signal.
async fn send_silent_exit_callback(reason: &str) {
    let Some(task_info) = task_info_from_env() else {
        warn!("no TASK_INFO available, cannot send silent_exit callback");
        return;
    };
    let (Some(task_id), Some(subtask_id)) = (task_info.task_id.clone(), task_info.subtask_id.clone()) else {
        warn!("missing task_id or subtask_id in TASK_INFO, cannot send silent_exit callback");
        return;
    };
    let Ok(callback_url) = std::env::var("CALLBACK_URL") else {
        warn!("CALLBACK_URL not set, cannot send silent_exit callback");
        return;
    };

    let payload = CallbackPayload {
        task_id,
        subtask_id,
        progress: 100,
        task_title: task_info.task_title,
        status: Some("COMPLETED".to_string()),
        error_message: Some(reason.to_string()),
        result: Some(serde_json::json!({
            "value": reason,
            "silent_exit": true,
            "silent_exit_reason": reason,
        })),
        executor_name: std::env::var("EXECUTOR_NAME").ok(),
        executor_namespace: std::env::var("EXECUTOR_NAMESPACE").ok(),
        task_type: task_info.task_type,
        sandbox_metadata: None,
    };

    let client = CallbackClient::new(callback_url, CallbackConfig::default());
    match client.send(&payload).await {
        Ok(_) => info!(task_id = %payload.task_id, "silent_exit callback sent"),
        Err(err) => warn!(error = %err, task_id = %payload.task_id, "failed to send silent_exit callback"),
    }
}

#[derive(Clone)]
struct SilentExitServer {
    tool_router: rmcp::handler::server::router::tool::ToolRouter<Self>,
}

impl SilentExitServer {
    fn new() -> Self {
        Self { tool_router: Self::tool_router() }
    }
}

#[tool_router]
impl SilentExitServer {
    #[tool(description = "Signal that the agent has nothing further to report and should exit without surfacing a result to the user")]
    async fn silent_exit(&self, params: Parameters<SilentExitArgs>) -> Result<String, McpError> {
        let marker = build_marker(&params.0);
        let reason = params.0.reason.unwrap_or_default();
        info!(%reason, "silent_exit invoked");
        send_silent_exit_callback(&reason).await;
        serde_json::to_string(&marker)
            .map_err(|e| McpError::internal_error(format!("failed to encode marker: {e}"), None))
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for SilentExitServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::default(),
            capabilities: rmcp::model::ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "wegent-mcp-silent-exit".to_string(),
                title: Some("Silent Exit Signal Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Call silent_exit when there is nothing worth reporting back to the user.".to_string(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("starting wegent-mcp-silent-exit");

    let server = SilentExitServer::new();
    let (stdin, stdout) = (tokio::io::stdin(), tokio::io::stdout());
    let service = server.serve((stdin, stdout)).await.context("failed to initialize MCP server")?;

    service.waiting().await.context("server error during execution")?;
    Ok(())
}
