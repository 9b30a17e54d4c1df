use std::path::PathBuf;

use serde::Deserialize;

use crate::error::AgentError;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Collector base URL, e.g. `http://collector.internal:8080`.
    pub server_url: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delivery attempts per batch before the records fall back to the
    /// durable queue.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_queue_path")]
    pub queue_path: PathBuf,
    #[serde(default = "default_device_id_path")]
    pub device_id_path: PathBuf,
    /// Optional `host:port` target for the TCP latency probe.
    pub latency_probe_addr: Option<String>,
    #[serde(default = "default_latency_probe_timeout_ms")]
    pub latency_probe_timeout_ms: u64,
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_metrics_path() -> String {
    "/api/metrics".to_string()
}

fn default_interval_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_queue_path() -> PathBuf {
    PathBuf::from("vigil-queue.json")
}

fn default_device_id_path() -> PathBuf {
    PathBuf::from("vigil-device-id")
}

fn default_latency_probe_timeout_ms() -> u64 {
    1000
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn login_url(&self) -> String {
        join_url(&self.server_url, &self.login_path)
    }

    pub fn metrics_url(&self) -> String {
        join_url(&self.server_url, &self.metrics_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Collector credentials, taken from the environment so no secret lives in
/// the configuration file.
#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub username: String,
    pub password: String,
}

pub const USERNAME_VAR: &str = "VIGIL_USERNAME";
pub const PASSWORD_VAR: &str = "VIGIL_PASSWORD";

impl LoginSettings {
    pub fn from_env() -> Result<Self, AgentError> {
        let username = std::env::var(USERNAME_VAR)
            .map_err(|_| AgentError::Config(format!("{USERNAME_VAR} is not set")))?;
        let password = std::env::var(PASSWORD_VAR)
            .map_err(|_| AgentError::Config(format!("{PASSWORD_VAR} is not set")))?;
        Ok(Self { username, password })
    }
}
