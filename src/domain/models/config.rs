//! Top-level configuration, merged by `ConfigLoader` (see
//! `infrastructure::config::loader`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub redis_url: String,
    pub callback_url: String,
    pub task_api_domain: String,
    pub executor_image: String,
    pub docker_host_addr: String,
    pub heartbeat: HeartbeatConfig,
    pub sandbox: SandboxConfig,
    pub callback: CallbackConfig,
    pub executor_ports: PortRangeConfig,
    pub delete_zombie_containers: bool,
    pub running_task_meta_ttl_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            callback_url: "http://127.0.0.1:8000/callback".to_string(),
            task_api_domain: "http://127.0.0.1:8000".to_string(),
            executor_image: "wegent/executor:latest".to_string(),
            docker_host_addr: "unix:///var/run/docker.sock".to_string(),
            heartbeat: HeartbeatConfig::default(),
            sandbox: SandboxConfig::default(),
            callback: CallbackConfig::default(),
            executor_ports: PortRangeConfig::default(),
            delete_zombie_containers: false,
            running_task_meta_ttl_secs: 604_800,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    pub timeout_secs: u64,
    pub check_interval_secs: u64,
    pub grace_period_secs: u64,
    pub key_ttl_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            check_interval_secs: 5,
            grace_period_secs: 30,
            key_ttl_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub default_timeout_secs: u64,
    pub execution_timeout_secs: u64,
    pub ready_timeout_secs: u64,
    pub redis_ttl_secs: u64,
    pub max_concurrent: u32,
    pub gc_interval_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 1800,
            execution_timeout_secs: 600,
            ready_timeout_secs: 20,
            redis_ttl_secs: 24 * 3600,
            max_concurrent: 50,
            gc_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    pub max_retries: u32,
    pub initial_delay_secs: f64,
    pub backoff_multiplier: f64,
    pub timeout_secs: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay_secs: 1.0,
            backoff_multiplier: 2.0,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortRangeConfig {
    pub min: u16,
    pub max: u16,
}

impl Default for PortRangeConfig {
    fn default() -> Self {
        Self { min: 40000, max: 45000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}
