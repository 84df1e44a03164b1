//! Domain layer for the agent-execution control plane.
//!
//! This module contains core business logic and domain models: the
//! `Sandbox`/`Execution` state machines, the ports other layers implement,
//! and the per-subsystem error types.

pub mod error;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use error::{
    CallbackError, ConfigError, DispatcherError, ExecutionError, HeartbeatError,
    RepositoryError, SandboxError,
};
