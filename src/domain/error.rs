//! Domain error types for the agent-execution control plane.
//!
//! Each enum represents errors from one subsystem boundary. Every variant
//! documents the failure it represents; transient/permanent classifiers let
//! callers decide whether to retry without matching on variants directly.

use thiserror::Error;

/// Errors surfaced by `SandboxManager` operations.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// `metadata.task_id` was not supplied where the operation requires it.
    #[error("missing task_id in sandbox metadata")]
    MissingTaskId,

    /// The sandbox does not exist.
    #[error("sandbox not found: {0}")]
    NotFound(String),

    /// The sandbox exists but is not in a state the operation permits.
    #[error("sandbox {0} is not active (status: {1})")]
    NotActive(String, String),

    /// `pause`/`resume` requested from a status that forbids it.
    #[error("invalid sandbox transition from {from} via {event}")]
    InvalidTransition { from: String, event: String },

    /// The container driver failed to start or manage the container.
    #[error("container driver error: {0}")]
    Dispatcher(#[from] DispatcherError),

    /// The underlying store degraded; treated as "accepted but volatile" by callers.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The container never became reachable within the ready-timeout window.
    #[error("container did not become ready within {0:?}")]
    ReadyTimeout(std::time::Duration),
}

/// Errors surfaced by `ExecutionRunner` / execution lifecycle operations.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// `metadata.subtask_id` was not supplied.
    #[error("missing subtask_id in execution metadata")]
    MissingSubtaskId,

    /// No execution exists for the given (sandbox_id, subtask_id) pair.
    #[error("execution not found for sandbox {0}, subtask {1}")]
    NotFound(String, String),

    /// The owning sandbox is not active; an execution cannot be attached to it.
    #[error("sandbox {0} is not active")]
    SandboxNotActive(String),

    /// The execute RPC timed out.
    #[error("executor container not responding (timeout)")]
    Timeout,

    /// The execute RPC could not connect to the container.
    #[error("cannot connect to executor container")]
    ConnectionFailed,

    /// The execute RPC returned a non-200 status.
    #[error("executor rejected execution request: status {status}, body: {body}")]
    RejectedByExecutor { status: u16, body: String },
}

impl ExecutionError {
    /// Returns true if retrying the same request might succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionFailed)
    }
}

/// Errors surfaced by the Redis-backed `SandboxRepository` adapter.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The Redis transport failed (connection, protocol, etc).
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Stored JSON could not be decoded; treated as a miss by callers.
    #[error("corrupt stored value for key {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RepositoryError {
    /// Returns true if the failure is a transport-level hiccup worth retrying.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Redis(_))
    }
}

/// Errors surfaced by `HeartbeatManager`.
#[derive(Error, Debug)]
pub enum HeartbeatError {
    /// The Redis transport failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The stored heartbeat value was not a valid Unix-seconds string.
    #[error("invalid heartbeat value for {0}")]
    InvalidValue(String),
}

/// Errors surfaced by the `ExecutorDispatcher` port.
#[derive(Error, Debug)]
pub enum DispatcherError {
    /// The driver reported a submission failure.
    #[error("submit_executor failed: {0}")]
    SubmitFailed(String),

    /// The driver reported a deletion failure (logged and swallowed by callers).
    #[error("delete_executor failed: {0}")]
    DeleteFailed(String),

    /// The named executor does not exist.
    #[error("executor not found: {0}")]
    NotFound(String),

    /// Pausing/unpausing failed.
    #[error("pause/unpause failed: {0}")]
    PauseFailed(String),
}

/// Errors surfaced by `CallbackClient`.
#[derive(Error, Debug)]
pub enum CallbackError {
    /// A 4xx response: terminal, never retried.
    #[error("client error ({status}) during callback")]
    ClientError {
        /// HTTP status code returned by the callback endpoint.
        status: u16,
    },

    /// Retries were exhausted against 5xx/transport failures.
    #[error("callback failed after exhausting retries: {0}")]
    RetriesExhausted(String),

    /// The response body could not be parsed as JSON.
    #[error("invalid callback response body: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

impl CallbackError {
    /// Returns true if the client-side retry loop should treat this as retryable.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::RetriesExhausted(_))
    }
}

/// Errors surfaced while loading and validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// figment failed to extract the configuration.
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    /// A configured value was outside its valid range.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Name of the offending field.
        field: String,
        /// The value that failed validation.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_transience() {
        assert!(ExecutionError::Timeout.is_transient());
        assert!(ExecutionError::ConnectionFailed.is_transient());
        assert!(!ExecutionError::MissingSubtaskId.is_transient());
    }

    #[test]
    fn callback_error_transience() {
        assert!(CallbackError::RetriesExhausted("boom".into()).is_transient());
        assert!(!CallbackError::ClientError { status: 400 }.is_transient());
    }

    #[test]
    fn repository_error_display() {
        let err = RepositoryError::Corrupt {
            key: "wegent-sandbox-session:1".to_string(),
            source: serde_json::from_str::<serde_json::Value>("{not json").unwrap_err(),
        };
        assert!(err.to_string().contains("wegent-sandbox-session:1"));
    }

    #[test]
    fn sandbox_error_display() {
        let err = SandboxError::NotActive("100".to_string(), "TERMINATED".to_string());
        assert_eq!(
            err.to_string(),
            "sandbox 100 is not active (status: TERMINATED)"
        );
    }
}
