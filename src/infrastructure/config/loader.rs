//! Configuration loader, grounded in the teacher's `ConfigLoader`:
//! programmatic defaults merged with an optional YAML file and
//! `WEGENT_`-prefixed environment variables, then validated.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid redis_url: must not be empty")]
    EmptyRedisUrl,

    #[error("invalid heartbeat.timeout_secs: {0}. Must be greater than 0")]
    InvalidHeartbeatTimeout(u64),

    #[error(
        "invalid heartbeat configuration: check_interval_secs ({0}) must be less than timeout_secs ({1})"
    )]
    InvalidHeartbeatInterval(u64, u64),

    #[error("invalid sandbox.max_concurrent: {0}. Must be greater than 0")]
    InvalidMaxConcurrent(u32),

    #[error("invalid sandbox.ready_timeout_secs: {0}. Must be greater than 0")]
    InvalidReadyTimeout(u64),

    #[error("invalid callback.max_retries: {0}. Must be greater than 0")]
    InvalidMaxRetries(u32),

    #[error(
        "invalid executor_ports range: min ({0}) must be less than max ({1})"
    )]
    InvalidPortRange(u16, u16),

    #[error("invalid logging.level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid logging.format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("failed to extract configuration: {0}")]
    Extract(#[from] figment::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `wegent.yaml` in the current directory, if present
    /// 3. `WEGENT_`-prefixed environment variables (`__` as the nesting
    ///    separator, e.g. `WEGENT_HEARTBEAT__TIMEOUT_SECS=45`)
    pub fn load() -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("wegent.yaml"))
            .merge(Env::prefixed("WEGENT_").split("__"))
            .extract()?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.redis_url.trim().is_empty() {
            return Err(ConfigError::EmptyRedisUrl);
        }

        if config.heartbeat.timeout_secs == 0 {
            return Err(ConfigError::InvalidHeartbeatTimeout(0));
        }
        if config.heartbeat.check_interval_secs >= config.heartbeat.timeout_secs {
            return Err(ConfigError::InvalidHeartbeatInterval(
                config.heartbeat.check_interval_secs,
                config.heartbeat.timeout_secs,
            ));
        }

        if config.sandbox.max_concurrent == 0 {
            return Err(ConfigError::InvalidMaxConcurrent(0));
        }
        if config.sandbox.ready_timeout_secs == 0 {
            return Err(ConfigError::InvalidReadyTimeout(0));
        }

        if config.callback.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(0));
        }

        if config.executor_ports.min >= config.executor_ports.max {
            return Err(ConfigError::InvalidPortRange(
                config.executor_ports.min,
                config.executor_ports.max,
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
