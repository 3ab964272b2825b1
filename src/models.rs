use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ClassifierError, Result};

/// A message retrieved from the user's mailbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: String,
    pub from: String,
    pub sender_name: String,
    pub sender_email: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub snippet: String,
    pub labels: Vec<String>,
}

/// Email content submitted for classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailInput {
    pub subject: String,
    pub from: String,
    pub body: String,
}

impl EmailInput {
    /// Sender used when the user leaves the field blank
    pub const DEFAULT_SENDER: &'static str = "customer@example.com";

    /// Build an input, falling back to the default sender for a blank `from`
    pub fn new(subject: impl Into<String>, from: Option<&str>, body: impl Into<String>) -> Self {
        let from = from
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(Self::DEFAULT_SENDER);

        Self {
            subject: subject.into(),
            from: from.to_string(),
            body: body.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.subject.trim().is_empty() && !self.body.trim().is_empty()
    }
}

impl From<&EmailMessage> for EmailInput {
    fn from(message: &EmailMessage) -> Self {
        EmailInput::new(message.subject.clone(), Some(&message.from), message.snippet.clone())
    }
}

/// Priority assigned by the classification model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::High, Priority::Medium, Priority::Low, Priority::Unknown];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One classified email as produced by the remote job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classified_at: Option<DateTime<Utc>>,
}

impl ClassificationResult {
    pub fn sender_display(&self) -> &str {
        self.from.as_deref().filter(|f| !f.is_empty()).unwrap_or("Unknown")
    }

    pub fn sentiment_display(&self) -> &str {
        self.sentiment.as_deref().filter(|s| !s.is_empty()).unwrap_or("N/A")
    }
}

/// Decoded `notebook_output.result` of a classification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub emails_processed: Vec<ClassificationResult>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobOutput {
    /// Unwrap the classified emails, turning `success: false` into an error
    pub fn into_results(self) -> Result<Vec<ClassificationResult>> {
        if self.success {
            Ok(self.emails_processed)
        } else {
            Err(ClassifierError::JobFailed(
                self.error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}

/// Format a 0..1 confidence as a percentage with one decimal
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.1}%", confidence * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_output_deserialization() {
        let json = r#"{
            "success": true,
            "emails_processed": [
                {
                    "subject": "Order Issue #12345",
                    "from": "customer@example.com",
                    "category": "Complaint",
                    "priority": "High",
                    "confidence": 0.92,
                    "sentiment": "Negative",
                    "reply": "We are sorry to hear that."
                },
                {
                    "subject": "Hello",
                    "category": "General",
                    "priority": "Urgent",
                    "confidence": 0.5
                }
            ]
        }"#;

        let output: JobOutput = serde_json::from_str(json).unwrap();
        assert!(output.success);
        assert_eq!(output.emails_processed.len(), 2);

        let first = &output.emails_processed[0];
        assert_eq!(first.priority, Priority::High);
        assert_eq!(first.sender_display(), "customer@example.com");
        assert_eq!(first.sentiment_display(), "Negative");

        let second = &output.emails_processed[1];
        assert_eq!(second.priority, Priority::Unknown);
        assert_eq!(second.sender_display(), "Unknown");
        assert_eq!(second.sentiment_display(), "N/A");
        assert!(second.reply.is_none());
    }

    #[test]
    fn test_failed_job_output() {
        let output: JobOutput =
            serde_json::from_str(r#"{"success": false, "error": "quota exhausted"}"#).unwrap();
        assert!(!output.success);
        assert!(output.emails_processed.is_empty());
        assert_eq!(output.error.as_deref(), Some("quota exhausted"));

        let err = output.into_results().unwrap_err();
        assert_eq!(err.to_string(), "Job failed: quota exhausted");

        let output: JobOutput = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert_eq!(output.into_results().unwrap_err().to_string(), "Job failed: Unknown error");
    }

    #[test]
    fn test_email_input_default_sender() {
        let input = EmailInput::new("Subject", Some("   "), "Body");
        assert_eq!(input.from, EmailInput::DEFAULT_SENDER);

        let input = EmailInput::new("Subject", None, "Body");
        assert_eq!(input.from, EmailInput::DEFAULT_SENDER);

        let input = EmailInput::new("Subject", Some("jane@example.com"), "Body");
        assert_eq!(input.from, "jane@example.com");
    }

    #[test]
    fn test_email_input_serializes_expected_keys() {
        let input = EmailInput::new("Refund", Some("a@b.com"), "Broken item");
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"subject": "Refund", "from": "a@b.com", "body": "Broken item"})
        );
    }

    #[test]
    fn test_email_input_completeness() {
        assert!(EmailInput::new("s", None, "b").is_complete());
        assert!(!EmailInput::new(" ", None, "b").is_complete());
        assert!(!EmailInput::new("s", None, "").is_complete());
    }

    #[test]
    fn test_format_confidence() {
        assert_eq!(format_confidence(0.923), "92.3%");
        assert_eq!(format_confidence(1.0), "100.0%");
        assert_eq!(format_confidence(0.0), "0.0%");
    }
}
