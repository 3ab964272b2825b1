use chrono::{DateTime, Utc};
use thiserror::Error;

/// Type alias for Result with ClassifierError
pub type Result<T> = std::result::Result<T, ClassifierError>;

/// Error types for the email classification pipeline
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// An upstream API returned an unexpected non-success response
    #[error("API error: {0}")]
    ApiError(String),

    /// Authentication failed (bad or expired token)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Databricks refused to start the classification job
    #[error("Job submission failed: {0}")]
    JobSubmissionFailed(String),

    /// Job terminated without success, or reported `success: false`
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// Job ended in INTERNAL_ERROR or SKIPPED
    #[error("Job error: {0}")]
    JobError(String),

    /// Job did not terminate within the polling budget
    #[error("Job timeout after {attempts} status checks")]
    JobTimeout { attempts: u32 },

    /// Job succeeded but produced no notebook output
    #[error("No output from job")]
    NoJobOutput,

    /// No Gmail access token could be resolved
    #[error("Gmail access token required: {0}")]
    MissingGmailToken(String),

    /// Required secrets are absent or blank
    #[error("Missing required secrets: {}", .0.join(", "))]
    MissingSecrets(Vec<String>),

    /// User input failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// User cancelled an interactive prompt
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ClassifierError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClassifierError::RateLimitExceeded { .. }
                | ClassifierError::ServerError { .. }
                | ClassifierError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Map a non-success HTTP status to an error variant
    pub fn from_status(status: u16, body: &str, retry_after: Option<&str>) -> Self {
        let message = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body.trim())
        };

        match status {
            400 => ClassifierError::BadRequest(message),
            401 => ClassifierError::AuthError(message),
            403 => ClassifierError::Forbidden(message),
            404 => ClassifierError::NotFound(message),
            429 => ClassifierError::RateLimitExceeded {
                retry_after: parse_retry_after(retry_after),
            },
            500..=599 => ClassifierError::ServerError { status, message },
            _ => ClassifierError::ApiError(message),
        }
    }
}

/// Parse a Retry-After header value
///
/// The header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Returns the number of seconds to wait. Missing, invalid or past values
/// fall back to 5 seconds.
pub fn parse_retry_after(value: Option<&str>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    let Some(value) = value.map(str::trim) else {
        return DEFAULT_RETRY_AFTER;
    };

    if let Ok(seconds) = value.parse::<u64>() {
        return seconds;
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        let remaining = date.with_timezone(&Utc) - Utc::now();
        if remaining.num_seconds() > 0 {
            return remaining.num_seconds() as u64;
        }
    }

    DEFAULT_RETRY_AFTER
}

impl From<reqwest::Error> for ClassifierError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ClassifierError::NetworkError(format!("Request timed out: {}", error))
        } else if error.is_connect() {
            ClassifierError::NetworkError(format!("Connection error: {}", error))
        } else if error.is_decode() {
            ClassifierError::InvalidResponse(error.to_string())
        } else if let Some(status) = error.status() {
            ClassifierError::from_status(status.as_u16(), &error.to_string(), None)
        } else {
            ClassifierError::NetworkError(error.to_string())
        }
    }
}

impl From<google_gmail1::Error> for ClassifierError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok());
                ClassifierError::from_status(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown"),
                    retry_after,
                )
            }
            google_gmail1::Error::BadRequest(ref err) => {
                ClassifierError::BadRequest(format!("{}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                ClassifierError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => ClassifierError::NetworkError(err.to_string()),
            google_gmail1::Error::MissingToken(err) => ClassifierError::AuthError(err.to_string()),
            _ => ClassifierError::ApiError(error.to_string()),
        }
    }
}

impl From<toml::de::Error> for ClassifierError {
    fn from(error: toml::de::Error) -> Self {
        ClassifierError::ConfigError(error.to_string())
    }
}
