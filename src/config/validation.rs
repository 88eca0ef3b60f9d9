use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream_config(config)?;
    validate_weather_config(config)?;
    validate_session_config(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    if let Some(max_blocking_threads) = server.runtime_max_blocking_threads {
        if max_blocking_threads == 0 {
            return Err(validation_err(
                "server.runtime_max_blocking_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|err| validation_err(format!("{field} is not a valid URL: {err}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(validation_err(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn validate_upstream_config(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    validate_http_url("upstream.base_url", &upstream.base_url)?;
    if upstream.api_key.trim().is_empty() {
        return Err(validation_err("upstream.api_key cannot be empty"));
    }
    if upstream.model.trim().is_empty() {
        return Err(validation_err("upstream.model cannot be empty"));
    }
    if upstream.system_prompt.trim().is_empty() {
        return Err(validation_err("upstream.system_prompt cannot be empty"));
    }
    if upstream.request_budget_bytes == 0 {
        return Err(validation_err(
            "upstream.request_budget_bytes must be greater than 0",
        ));
    }
    if upstream.idle_read_timeout_secs == 0 {
        return Err(validation_err(
            "upstream.idle_read_timeout_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_weather_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_http_url("weather.endpoint", &config.weather.endpoint)?;
    if config.weather.timeout_secs == 0 {
        return Err(validation_err(
            "weather.timeout_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_session_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.session.max_turns == 0 {
        return Err(validation_err("session.max_turns must be greater than 0"));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DISABLED", "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL",
];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is invalid. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.upstream.api_key = "sk-test".to_string();
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let mut config = valid_config();
        config.upstream.api_key = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut config = valid_config();
        config.upstream.base_url = "ftp://api.deepseek.com".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let mut config = valid_config();
        config.upstream.request_budget_bytes = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_max_turns_rejected() {
        let mut config = valid_config();
        config.session.max_turns = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let mut config = valid_config();
        config.features.log_level = "TRACEY".to_string();
        assert!(validate_config(&config).is_err());
    }
}
