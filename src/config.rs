use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ClassifierError, Result};

/// Smallest and largest number of emails a single processing run may request
pub const MIN_EMAIL_COUNT: u32 = 1;
pub const MAX_EMAIL_COUNT: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub databricks: DatabricksConfig,
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub deepseek: DeepSeekConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabricksConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_test_timeout")]
    pub connect_test_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

impl Default for DatabricksConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            request_timeout_secs: default_request_timeout(),
            connect_test_timeout_secs: default_connect_test_timeout(),
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

impl DatabricksConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_test_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_test_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(default = "default_email_count")]
    pub default_email_count: u32,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            default_email_count: default_email_count(),
            label: default_label(),
            query: default_query(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepSeekConfig {
    #[serde(default = "default_deepseek_base_url")]
    pub base_url: String,
}

impl Default for DeepSeekConfig {
    fn default() -> Self {
        Self {
            base_url: default_deepseek_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
        }
    }
}

fn default_poll_interval() -> u64 {
    10
}

fn default_max_poll_attempts() -> u32 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_test_timeout() -> u64 {
    10
}

fn default_max_concurrent_runs() -> usize {
    2
}

fn default_email_count() -> u32 {
    3
}

fn default_label() -> String {
    "INBOX".to_string()
}

fn default_query() -> String {
    "is:unread".to_string()
}

fn default_max_concurrent() -> usize {
    10
}

fn default_deepseek_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_recent_limit() -> usize {
    5
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ClassifierError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            ClassifierError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ClassifierError::ConfigError(format!(
                        "Failed to create config directory: {}",
                        e
                    ))
                })?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            ClassifierError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        tokio::fs::write(path, content).await.map_err(|e| {
            ClassifierError::ConfigError(format!("Failed to write config file: {}", e))
        })?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let db = &self.databricks;
        if db.poll_interval_secs == 0 {
            return Err(ClassifierError::ConfigError(
                "databricks.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if db.max_poll_attempts == 0 {
            return Err(ClassifierError::ConfigError(
                "databricks.max_poll_attempts must be at least 1".to_string(),
            ));
        }
        if db.request_timeout_secs == 0 || db.connect_test_timeout_secs == 0 {
            return Err(ClassifierError::ConfigError(
                "databricks timeouts must be at least 1 second".to_string(),
            ));
        }
        check_concurrency("databricks.max_concurrent_runs", db.max_concurrent_runs)?;

        let gmail = &self.gmail;
        if !(MIN_EMAIL_COUNT..=MAX_EMAIL_COUNT).contains(&gmail.default_email_count) {
            return Err(ClassifierError::ConfigError(format!(
                "gmail.default_email_count must be between {} and {}",
                MIN_EMAIL_COUNT, MAX_EMAIL_COUNT
            )));
        }
        if gmail.label.trim().is_empty() {
            return Err(ClassifierError::ConfigError(
                "gmail.label cannot be empty".to_string(),
            ));
        }
        check_concurrency("gmail.max_concurrent_requests", gmail.max_concurrent_requests)?;

        let base_url = &self.deepseek.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClassifierError::ConfigError(format!(
                "deepseek.base_url must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        if self.display.recent_limit == 0 {
            return Err(ClassifierError::ConfigError(
                "display.recent_limit must be at least 1".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

fn check_concurrency(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(ClassifierError::ConfigError(format!(
            "{} must be at least 1",
            name
        )));
    }
    if value > 50 {
        return Err(ClassifierError::ConfigError(format!(
            "{} cannot exceed 50",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.databricks.poll_interval_secs, 10);
        assert_eq!(config.databricks.max_poll_attempts, 30);
        assert_eq!(config.databricks.request_timeout_secs, 30);
        assert_eq!(config.databricks.connect_test_timeout_secs, 10);
        assert_eq!(config.databricks.max_concurrent_runs, 2);

        assert_eq!(config.gmail.default_email_count, 3);
        assert_eq!(config.gmail.label, "INBOX");
        assert_eq!(config.gmail.query, "is:unread");

        assert_eq!(config.deepseek.base_url, "https://api.deepseek.com");
        assert_eq!(config.display.recent_limit, 5);
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_poll_interval_zero() {
        let mut config = Config::default();
        config.databricks.poll_interval_secs = 0;
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn test_poll_attempts_zero() {
        let mut config = Config::default();
        config.databricks.max_poll_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_email_count_bounds() {
        let mut config = Config::default();

        config.gmail.default_email_count = 0;
        assert!(config.validate().is_err());

        config.gmail.default_email_count = 11;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("between 1 and 10"));

        config.gmail.default_email_count = 1;
        assert!(config.validate().is_ok());

        config.gmail.default_email_count = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut config = Config::default();
        config.gmail.max_concurrent_requests = 51;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("cannot exceed 50"));

        let mut config = Config::default();
        config.databricks.max_concurrent_runs = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("max_concurrent_runs must be at least 1"));
    }

    #[test]
    fn test_empty_label() {
        let mut config = Config::default();
        config.gmail.label = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = Config::default();
        config.deepseek.base_url = "api.deepseek.com".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("deepseek.base_url"));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.databricks.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.databricks.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.databricks.connect_test_timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_config_load_save_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.databricks.max_poll_attempts = 12;
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.databricks.max_poll_attempts, 12);
        assert_eq!(loaded.gmail.query, "is:unread");
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/nonexistent-classifier-config-12345.toml");
        let config = Config::load(path).await.unwrap();
        assert_eq!(config.databricks.poll_interval_secs, 10);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(temp_file.path()).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let partial_config = r#"
[databricks]
poll_interval_secs = 2

[gmail]
query = "is:unread newer_than:1d"
"#;
        tokio::fs::write(temp_file.path(), partial_config).await.unwrap();

        let config = Config::load(temp_file.path()).await.unwrap();

        assert_eq!(config.databricks.poll_interval_secs, 2);
        assert_eq!(config.gmail.query, "is:unread newer_than:1d");

        assert_eq!(config.databricks.max_poll_attempts, 30);
        assert_eq!(config.gmail.label, "INBOX");
        assert_eq!(config.display.recent_limit, 5);
    }

    #[tokio::test]
    async fn test_config_create_example() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        Config::create_example(path).await.unwrap();
        let config = Config::load(path).await.unwrap();
        assert_eq!(config.gmail.default_email_count, 3);
    }
}
