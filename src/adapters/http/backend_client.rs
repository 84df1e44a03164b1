//! HTTP-backed `BackendClient` (§4.5.8, §4.8), reaching the back-end task
//! API named in spec §1 as an out-of-scope external collaborator — only
//! the contract this core depends on is implemented here.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::error::CallbackError;
use crate::domain::ports::{BackendClient, BackendTaskStatus, ValidationStatus, ValidationStatusUpdate};

pub struct HttpBackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn status_wire(status: BackendTaskStatus) -> &'static str {
        match status {
            BackendTaskStatus::Pending => "PENDING",
            BackendTaskStatus::Running => "RUNNING",
            BackendTaskStatus::Completed => "COMPLETED",
            BackendTaskStatus::Failed => "FAILED",
            BackendTaskStatus::Cancelled => "CANCELLED",
        }
    }

    fn validation_status_wire(status: ValidationStatus) -> &'static str {
        match status {
            ValidationStatus::RunningChecks => "running_checks",
            ValidationStatus::Completed => "completed",
        }
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn get_task_status(&self, task_id: &str) -> Result<Option<BackendTaskStatus>, CallbackError> {
        let url = format!("{}/api/tasks/{task_id}", self.base_url.trim_end_matches('/'));
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(err) => return Err(CallbackError::RetriesExhausted(err.to_string())),
        };
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CallbackError::ClientError { status: response.status().as_u16() });
        }
        let body: Value = response.json().await.map_err(|err| CallbackError::RetriesExhausted(err.to_string()))?;
        let status = match body.get("status").and_then(Value::as_str) {
            Some("PENDING") => BackendTaskStatus::Pending,
            Some("RUNNING") => BackendTaskStatus::Running,
            Some("COMPLETED") => BackendTaskStatus::Completed,
            Some("FAILED") => BackendTaskStatus::Failed,
            Some("CANCELLED") => BackendTaskStatus::Cancelled,
            _ => return Ok(None),
        };
        Ok(Some(status))
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        status: BackendTaskStatus,
        error_message: Option<&str>,
        result: Option<Value>,
        executor_name: Option<&str>,
    ) -> Result<(), CallbackError> {
        let url = format!("{}/api/tasks/{task_id}/status", self.base_url.trim_end_matches('/'));
        let body = json!({
            "status": Self::status_wire(status),
            "error_message": error_message,
            "result": result,
            "executor_name": executor_name,
        });
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| CallbackError::RetriesExhausted(err.to_string()))?;
        if response.status().is_client_error() {
            return Err(CallbackError::ClientError { status: response.status().as_u16() });
        }
        if !response.status().is_success() {
            return Err(CallbackError::RetriesExhausted(format!("status {}", response.status())));
        }
        Ok(())
    }

    async fn update_validation_status(&self, update: ValidationStatusUpdate) -> Result<(), CallbackError> {
        let url = format!(
            "{}/api/shells/validation-status/{}",
            self.base_url.trim_end_matches('/'),
            update.validation_id
        );
        let body = json!({
            "status": Self::validation_status_wire(update.status),
            "stage": update.stage,
            "progress": update.progress,
            "valid": update.valid,
            "checks": update.checks,
            "errors": update.errors,
            "errorMessage": update.error_message,
            "executor_name": update.executor_name,
        });
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| CallbackError::RetriesExhausted(err.to_string()))?;
        if response.status().is_client_error() {
            return Err(CallbackError::ClientError { status: response.status().as_u16() });
        }
        if !response.status().is_success() {
            return Err(CallbackError::RetriesExhausted(format!("status {}", response.status())));
        }
        Ok(())
    }
}
