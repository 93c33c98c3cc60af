use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::errors::{ApiError, ApiResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_upload_mb: u64,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 120,
            poll_interval_ms: 2000,
            max_upload_mb: 2048, // 2GB upload ceiling
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

fn get_config_path() -> ApiResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ApiError::Config("Could not find config directory".to_string()))?
        .join("SentryView");

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("client.json"))
}

pub fn load_config() -> ApiResult<ClientConfig> {
    let config_path = get_config_path()?;

    if config_path.exists() {
        let config_str = fs::read_to_string(&config_path)?;
        let config: ClientConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
            log::warn!("Failed to parse config file: {}. Using defaults.", e);
            ClientConfig::default()
        });

        validate_config(&config)?;

        Ok(config)
    } else {
        let default_config = ClientConfig::default();
        save_config_internal(&default_config)?;
        Ok(default_config)
    }
}

pub fn save_config(config: &ClientConfig) -> ApiResult<()> {
    validate_config(config)?;
    save_config_internal(config)
}

fn save_config_internal(config: &ClientConfig) -> ApiResult<()> {
    let config_path = get_config_path()?;

    // Keep a backup of the previous file
    if config_path.exists() {
        let backup_path = config_path.with_extension("json.bak");
        if let Err(e) = fs::copy(&config_path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(&config_path, config_str)?;

    log::info!("Configuration saved successfully");
    Ok(())
}

pub fn get_data_directory() -> ApiResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ApiError::Config("Could not find data directory".to_string()))?
        .join("SentryView");

    fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

pub fn validate_config(config: &ClientConfig) -> ApiResult<()> {
    if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
        return Err(ApiError::validation(
            "base_url",
            "Must be an http:// or https:// URL",
        ));
    }

    if config.base_url.trim_end_matches('/').is_empty() {
        return Err(ApiError::validation("base_url", "Cannot be empty"));
    }

    if config.request_timeout_secs == 0 {
        return Err(ApiError::validation(
            "request_timeout_secs",
            "Must be greater than 0",
        ));
    }

    if config.poll_interval_ms < 250 {
        return Err(ApiError::validation(
            "poll_interval_ms",
            "Must be at least 250ms",
        ));
    }

    if config.max_upload_mb == 0 {
        return Err(ApiError::validation(
            "max_upload_mb",
            "Must be greater than 0",
        ));
    }

    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(ApiError::validation(
            "log_level",
            "Must be a valid log level",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.poll_interval().as_millis(), 2000);
        assert_eq!(config.max_upload_bytes(), 2048 * 1024 * 1024);
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let mut config = ClientConfig::default();
        config.base_url = "ftp://example.com".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_tight_poll_interval() {
        let mut config = ClientConfig::default();
        config.poll_interval_ms = 50;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_upload_ceiling() {
        let mut config = ClientConfig::default();
        config.max_upload_mb = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut config = ClientConfig::default();
        config.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }
}
