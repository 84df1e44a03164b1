//! Configuration management infrastructure.
//!
//! Hierarchical configuration using `figment`: programmatic defaults,
//! optional YAML file, `WEGENT_`-prefixed environment variables.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
