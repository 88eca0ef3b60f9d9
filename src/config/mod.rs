pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_max_blocking_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            runtime_max_blocking_threads: Some(8),
            base_path: String::new(),
        }
    }
}

/// Upstream chat-completion provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Serialized-size budget for the outbound payload including the full
    /// session history. Tripping it discards the whole history.
    #[serde(default = "default_request_budget_bytes")]
    pub request_budget_bytes: usize,
    /// Idle-read timeout on the upstream stream; a stall past this bound
    /// surfaces a terminal `error` event.
    #[serde(default = "default_idle_read_timeout_secs")]
    pub idle_read_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}
fn default_model() -> String {
    "deepseek-chat".to_string()
}
fn default_system_prompt() -> String {
    "你是一个专业的中文编程助手，回答要简洁、直接、实用。你可以调用工具：calculator、weather_query、web_search。"
        .to_string()
}
fn default_request_budget_bytes() -> usize {
    30 * 1024
}
fn default_idle_read_timeout_secs() -> u64 {
    120
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            request_budget_bytes: default_request_budget_bytes(),
            idle_read_timeout_secs: default_idle_read_timeout_secs(),
        }
    }
}

/// Third-party weather provider configuration for the `weather_query` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_endpoint")]
    pub endpoint: String,
    /// Server-held AppCode credential. Empty means the tool reports a
    /// configuration error instead of calling out.
    #[serde(default)]
    pub app_code: String,
    #[serde(default = "default_weather_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_weather_endpoint() -> String {
    "https://ali-weather.showapi.com/area-to-weather".to_string()
}
fn default_weather_timeout_secs() -> u64 {
    10
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            endpoint: default_weather_endpoint(),
            app_code: String::new(),
            timeout_secs: default_weather_timeout_secs(),
        }
    }
}

/// In-memory session bookkeeping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Per-session turn cap; appending past it drops the oldest turns.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

fn default_max_turns() -> usize {
    256
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.upstream.model, "deepseek-chat");
        assert_eq!(config.upstream.request_budget_bytes, 30 * 1024);
        assert_eq!(config.session.max_turns, 256);
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = serde_yaml::from_str("upstream:\n  api_key: sk-test\n").unwrap();
        assert_eq!(config.upstream.base_url, "https://api.deepseek.com");
        assert_eq!(config.upstream.idle_read_timeout_secs, 120);
        assert!(config.weather.app_code.is_empty());
        assert_eq!(config.features.log_level, "INFO");
    }
}
