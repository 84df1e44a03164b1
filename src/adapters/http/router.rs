//! Thin `axum` router exposing the manager-side HTTP surface (§6.2).
//!
//! No business logic lives here: every handler deserializes its body and
//! delegates immediately into `SandboxManager`/`CallbackHandler`, the same
//! entrypoint-vs-service boundary the teacher's CLI layer keeps.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::domain::models::CallbackPayload;
use crate::domain::ports::{
    BackendClient, ExecutorDispatcher, HeartbeatStore, RunningTaskTracker, SandboxRepository,
};
use crate::services::{CallbackHandler, SandboxManager};

pub struct AppState<R, D, H, T, B>
where
    R: SandboxRepository,
    D: ExecutorDispatcher,
    H: HeartbeatStore,
    T: RunningTaskTracker,
    B: BackendClient,
{
    pub sandbox_manager: Arc<SandboxManager<R, D, H>>,
    pub callback_handler: Arc<CallbackHandler<R, T, B>>,
    pub heartbeats: Arc<H>,
    pub tracker: Arc<T>,
    pub dispatcher: Arc<D>,
}

impl<R, D, H, T, B> Clone for AppState<R, D, H, T, B>
where
    R: SandboxRepository,
    D: ExecutorDispatcher,
    H: HeartbeatStore,
    T: RunningTaskTracker,
    B: BackendClient,
{
    fn clone(&self) -> Self {
        Self {
            sandbox_manager: self.sandbox_manager.clone(),
            callback_handler: self.callback_handler.clone(),
            heartbeats: self.heartbeats.clone(),
            tracker: self.tracker.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

#[derive(Deserialize)]
pub struct CancelRequest {
    task_id: String,
}

#[derive(Deserialize)]
pub struct ExecutorDeleteRequest {
    executor_name: String,
}

pub fn build_router<R, D, H, T, B>(state: AppState<R, D, H, T, B>) -> Router
where
    R: SandboxRepository + 'static,
    D: ExecutorDispatcher + 'static,
    H: HeartbeatStore + 'static,
    T: RunningTaskTracker + 'static,
    B: BackendClient + 'static,
{
    Router::new()
        .route("/callback", post(callback::<R, D, H, T, B>))
        .route("/tasks/:task_id/heartbeat", post(task_heartbeat::<R, D, H, T, B>))
        .route("/tasks/cancel", post(tasks_cancel::<R, D, H, T, B>))
        .route("/executor/delete", post(executor_delete::<R, D, H, T, B>))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn callback<R, D, H, T, B>(
    State(state): State<AppState<R, D, H, T, B>>,
    Json(payload): Json<CallbackPayload>,
) -> StatusCode
where
    R: SandboxRepository,
    D: ExecutorDispatcher,
    H: HeartbeatStore,
    T: RunningTaskTracker,
    B: BackendClient,
{
    match state.callback_handler.handle(payload).await {
        Ok(()) => StatusCode::OK,
        Err(crate::domain::error::CallbackError::ClientError { status }) => {
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST)
        }
        Err(err) => {
            tracing::error!(error = %err, "callback handler failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn task_heartbeat<R, D, H, T, B>(
    Path(task_id): Path<String>,
    State(state): State<AppState<R, D, H, T, B>>,
) -> StatusCode
where
    R: SandboxRepository,
    D: ExecutorDispatcher,
    H: HeartbeatStore,
    T: RunningTaskTracker,
    B: BackendClient,
{
    match state.heartbeats.update_heartbeat(&task_id, crate::domain::models::HeartbeatKind::Task).await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::warn!(error = %err, %task_id, "task_heartbeat: failed to persist heartbeat");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn tasks_cancel<R, D, H, T, B>(
    State(state): State<AppState<R, D, H, T, B>>,
    Json(body): Json<CancelRequest>,
) -> StatusCode
where
    R: SandboxRepository,
    D: ExecutorDispatcher,
    H: HeartbeatStore,
    T: RunningTaskTracker,
    B: BackendClient,
{
    match state.tracker.get_task_metadata(&body.task_id).await {
        Ok(Some(meta)) => {
            if let Err(err) = state.dispatcher.cancel_executor(&meta.executor_name).await {
                tracing::warn!(error = %err, task_id = %body.task_id, executor_name = %meta.executor_name, "tasks_cancel: failed to cancel executor");
            }
        }
        Ok(None) => {
            tracing::warn!(task_id = %body.task_id, "tasks_cancel: no running task metadata, skipping executor cancel");
        }
        Err(err) => {
            tracing::warn!(error = %err, task_id = %body.task_id, "tasks_cancel: failed to look up task metadata");
        }
    }

    if let Err(err) = state.tracker.remove_running_task(&body.task_id).await {
        tracing::warn!(error = %err, task_id = %body.task_id, "tasks_cancel: failed to remove running task");
    }
    if let Err(err) = state.heartbeats.delete_heartbeat(&body.task_id, crate::domain::models::HeartbeatKind::Task).await {
        tracing::warn!(error = %err, task_id = %body.task_id, "tasks_cancel: failed to delete heartbeat");
    }
    StatusCode::OK
}

async fn executor_delete<R, D, H, T, B>(
    State(state): State<AppState<R, D, H, T, B>>,
    Json(body): Json<ExecutorDeleteRequest>,
) -> StatusCode
where
    R: SandboxRepository,
    D: ExecutorDispatcher,
    H: HeartbeatStore,
    T: RunningTaskTracker,
    B: BackendClient,
{
    match state.dispatcher.delete_executor(&body.executor_name).await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::warn!(error = %err, executor_name = %body.executor_name, "executor_delete: delete_executor failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
