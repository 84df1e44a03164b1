//! `executor-manager` — the control-plane process: loads configuration,
//! connects to Redis, wires the domain ports to their Redis/HTTP/fake
//! adapters, serves the manager's HTTP surface, and runs the three
//! periodic background jobs until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};

use wegent_control_plane::adapters::dispatcher::FakeExecutorDispatcher;
use wegent_control_plane::adapters::http::{build_router, AppState, HttpBackendClient};
use wegent_control_plane::adapters::redis::{
    self, RedisDistributedLock, RedisHeartbeatStore, RedisRunningTaskTracker, RedisSandboxRepository,
};
use wegent_control_plane::infrastructure::config::ConfigLoader;
use wegent_control_plane::infrastructure::logging::LoggerImpl;
use wegent_control_plane::services::{self, CallbackHandler, SandboxManager};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _logger = LoggerImpl::init(&config.logging).context("failed to initialize logger")?;

    tracing::info!(redis_url = %config.redis_url, "starting executor-manager");

    let conn = redis::connect(&config.redis_url)
        .await
        .context("failed to connect to redis")?;

    let repo = Arc::new(RedisSandboxRepository::new(conn.clone(), config.sandbox.redis_ttl_secs));
    let heartbeats = Arc::new(RedisHeartbeatStore::new(conn.clone(), config.heartbeat.key_ttl_secs));
    let tracker = Arc::new(RedisRunningTaskTracker::new(conn.clone(), config.running_task_meta_ttl_secs));
    let lock = Arc::new(RedisDistributedLock::new(conn.clone()));
    let dispatcher = Arc::new(FakeExecutorDispatcher::new());
    let backend = Arc::new(HttpBackendClient::new(config.task_api_domain.clone()));

    let sandbox_manager = Arc::new(SandboxManager::new(
        repo.clone(),
        dispatcher.clone(),
        heartbeats.clone(),
        config.sandbox.clone(),
        config.heartbeat.clone(),
        config.executor_image.clone(),
        config.callback_url.clone(),
    ));
    let callback_handler = Arc::new(CallbackHandler::new(repo.clone(), tracker.clone(), backend.clone()));

    services::scheduler::spawn_all(
        sandbox_manager.clone(),
        repo.clone(),
        tracker.clone(),
        heartbeats.clone(),
        dispatcher.clone(),
        backend.clone(),
        lock.clone(),
        config.heartbeat.check_interval_secs,
        config.sandbox.gc_interval_secs,
        config.heartbeat.timeout_secs as i64,
        config.heartbeat.grace_period_secs as i64,
        config.delete_zombie_containers,
    );

    let state = AppState {
        sandbox_manager,
        callback_handler,
        heartbeats,
        tracker,
        dispatcher,
    };
    let app = build_router(state);

    let addr: SocketAddr = std::env::var("WEGENT_BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .context("invalid WEGENT_BIND_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind manager HTTP listener")?;
    tracing::info!(%addr, "manager HTTP surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("manager HTTP server failed")?;

    tracing::info!("executor-manager shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("received shutdown signal");
}
