//! Executor-side callback client (§4.8), grounded in `callback_client.py`.
//!
//! Exponential backoff with a terminal/retryable split: 4xx responses are
//! never retried, 5xx and transport errors are retried up to the
//! configured cap.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde_json::Value;

use crate::domain::error::CallbackError;
use crate::domain::models::{CallbackConfig, CallbackPayload};

pub struct CallbackClient {
    http: reqwest::Client,
    callback_url: String,
    config: CallbackConfig,
}

impl CallbackClient {
    pub fn new(callback_url: impl Into<String>, config: CallbackConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            callback_url: callback_url.into(),
            config,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_secs_f64(self.config.initial_delay_secs),
            multiplier: self.config.backoff_multiplier,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    /// Sends the flat callback payload, retrying 5xx/transport failures
    /// up to `max_retries` attempts with multiplicative backoff. A 4xx is
    /// terminal and returned immediately without consuming further retries.
    pub async fn send(&self, payload: &CallbackPayload) -> Result<Value, CallbackError> {
        let mut backoff = self.backoff();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self
                .http
                .post(&self.callback_url)
                .json(payload)
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    let bytes = response.bytes().await.unwrap_or_default();
                    let body = if bytes.is_empty() {
                        Value::Null
                    } else {
                        serde_json::from_slice(&bytes)?
                    };
                    return Ok(body);
                }
                Ok(response) if response.status().is_client_error() => {
                    return Err(CallbackError::ClientError { status: response.status().as_u16() });
                }
                Ok(response) => {
                    tracing::warn!(
                        status = response.status().as_u16(),
                        attempt,
                        task_id = %payload.task_id,
                        "callback attempt failed with a server error, retrying"
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, attempt, task_id = %payload.task_id, "callback attempt failed, retrying");
                }
            }

            if attempt >= self.config.max_retries {
                return Err(CallbackError::RetriesExhausted(format!(
                    "gave up after {attempt} attempts"
                )));
            }
            let Some(delay) = backoff.next_backoff() else {
                return Err(CallbackError::RetriesExhausted("backoff exhausted".to_string()));
            };
            tokio::time::sleep(delay).await;
        }
    }
}
