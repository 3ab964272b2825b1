//! Credential store for the Databricks and DeepSeek secrets
//!
//! Secrets live in a TOML file using the upper-case key names below and are
//! read once at start-up. Environment variables with the same names take
//! precedence over the file, which keeps tokens out of disk in CI.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{ClassifierError, Result};

pub const DATABRICKS_HOST: &str = "DATABRICKS_HOST";
pub const DATABRICKS_TOKEN: &str = "DATABRICKS_TOKEN";
pub const DEEPSEEK_API_KEY: &str = "DEEPSEEK_API_KEY";
pub const DATABRICKS_JOB_ID: &str = "DATABRICKS_JOB_ID";

static HOST_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9.-]+(:[0-9]+)?(/.*)?$").expect("host pattern is valid")
});

/// Job ids may be written either as a string or a bare integer
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum JobIdValue {
    Number(i64),
    Text(String),
}

impl JobIdValue {
    fn as_text(&self) -> String {
        match self {
            JobIdValue::Number(n) => n.to_string(),
            JobIdValue::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Default, Deserialize)]
struct RawSecrets {
    #[serde(rename = "DATABRICKS_HOST")]
    databricks_host: Option<String>,
    #[serde(rename = "DATABRICKS_TOKEN")]
    databricks_token: Option<String>,
    #[serde(rename = "DEEPSEEK_API_KEY")]
    deepseek_api_key: Option<String>,
    #[serde(rename = "DATABRICKS_JOB_ID")]
    databricks_job_id: Option<JobIdValue>,
}

/// Authentication material for the outbound service calls
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    pub databricks_host: String,
    pub databricks_token: String,
    pub deepseek_api_key: String,
    pub databricks_job_id: Option<String>,
}

impl Secrets {
    /// Parse and validate secrets from TOML text without consulting the environment
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawSecrets = toml::from_str(content)
            .map_err(|e| ClassifierError::ConfigError(format!("Failed to parse secrets: {}", e)))?;
        Self::from_raw(raw)
    }

    /// Load secrets from `path`, applying environment overrides
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ClassifierError::ConfigError(format!(
                "Failed to read secrets file {:?}: {}",
                path, e
            ))
        })?;

        let mut raw: RawSecrets = toml::from_str(&content)
            .map_err(|e| ClassifierError::ConfigError(format!("Failed to parse secrets: {}", e)))?;
        raw.apply_env_overrides();

        let secrets = Self::from_raw(raw)?;
        tracing::info!("Loaded secrets from {:?}", path);
        Ok(secrets)
    }

    fn from_raw(raw: RawSecrets) -> Result<Self> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let host = present(&raw.databricks_host);
        let token = present(&raw.databricks_token);
        let api_key = present(&raw.deepseek_api_key);

        let missing: Vec<String> = [
            (DATABRICKS_HOST, host.is_none()),
            (DATABRICKS_TOKEN, token.is_none()),
            (DEEPSEEK_API_KEY, api_key.is_none()),
        ]
        .into_iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| name.to_string())
        .collect();

        match (host, token, api_key) {
            (Some(host), Some(token), Some(api_key)) => Ok(Self {
                databricks_host: normalize_host(&host)?,
                databricks_token: token,
                deepseek_api_key: api_key,
                databricks_job_id: raw
                    .databricks_job_id
                    .map(|id| id.as_text())
                    .filter(|id| !id.is_empty()),
            }),
            _ => Err(ClassifierError::MissingSecrets(missing)),
        }
    }

    /// The configured job id as the integer the Jobs API expects
    pub fn job_id(&self) -> Result<i64> {
        let raw = self.databricks_job_id.as_deref().ok_or_else(|| {
            ClassifierError::ConfigError(format!("{} is not configured", DATABRICKS_JOB_ID))
        })?;

        raw.parse::<i64>().map_err(|_| {
            ClassifierError::ConfigError(format!(
                "{} must be numeric, got '{}'",
                DATABRICKS_JOB_ID, raw
            ))
        })
    }

    /// Write a template secrets file with placeholder values
    pub async fn create_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let template = format!(
            "{} = \"<workspace URL>\"\n{} = \"<API token>\"\n{} = \"<API key>\"\n# {} = \"<job id>\"\n",
            DATABRICKS_HOST, DATABRICKS_TOKEN, DEEPSEEK_API_KEY, DATABRICKS_JOB_ID
        );
        tokio::fs::write(path, template).await?;
        crate::auth::secure_file(path).await?;

        tracing::info!("Wrote secrets template to {:?}", path);
        Ok(())
    }
}

impl RawSecrets {
    fn apply_env_overrides(&mut self) {
        let from_env = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(value) = from_env(DATABRICKS_HOST) {
            tracing::debug!("{} overridden from environment", DATABRICKS_HOST);
            self.databricks_host = Some(value);
        }
        if let Some(value) = from_env(DATABRICKS_TOKEN) {
            tracing::debug!("{} overridden from environment", DATABRICKS_TOKEN);
            self.databricks_token = Some(value);
        }
        if let Some(value) = from_env(DEEPSEEK_API_KEY) {
            tracing::debug!("{} overridden from environment", DEEPSEEK_API_KEY);
            self.deepseek_api_key = Some(value);
        }
        if let Some(value) = from_env(DATABRICKS_JOB_ID) {
            tracing::debug!("{} overridden from environment", DATABRICKS_JOB_ID);
            self.databricks_job_id = Some(JobIdValue::Text(value));
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("databricks_host", &self.databricks_host)
            .field("databricks_token", &"<redacted>")
            .field("deepseek_api_key", &"<redacted>")
            .field("databricks_job_id", &self.databricks_job_id)
            .finish()
    }
}

/// Prepend a scheme to bare hostnames and strip trailing slashes
fn normalize_host(host: &str) -> Result<String> {
    let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    let normalized = with_scheme.trim_end_matches('/').to_string();

    if !HOST_PATTERN.is_match(&normalized) {
        return Err(ClassifierError::ConfigError(format!(
            "{} is not a valid workspace URL: '{}'",
            DATABRICKS_HOST, host
        )));
    }

    Ok(normalized)
}
