//! Common test utilities and fixtures
#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use email_classifier::config::DatabricksConfig;
use email_classifier::databricks::{ClassificationInvoker, PollCallback, RunId};
use email_classifier::error::Result;
use email_classifier::gmail::{LabelInfo, MailFetcher};
use email_classifier::models::{
    ClassificationResult, EmailInput, EmailMessage, JobOutput, Priority,
};
use email_classifier::secrets::Secrets;
use mockall::mock;
use serde_json::json;
use std::time::Duration;

/// Create a test message with default values
pub fn create_test_message(id: &str, sender: &str, subject: &str) -> EmailMessage {
    EmailMessage {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        from: format!("Test Sender <{}>", sender),
        sender_name: "Test Sender".to_string(),
        sender_email: sender.to_string(),
        subject: subject.to_string(),
        date: Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap(),
        snippet: format!("Body of {}", subject),
        labels: vec!["INBOX".to_string(), "UNREAD".to_string()],
    }
}

/// Create a classification result with the fields the analytics care about
pub fn create_result(
    subject: &str,
    category: &str,
    priority: Priority,
    confidence: f64,
) -> ClassificationResult {
    ClassificationResult {
        subject: subject.to_string(),
        from: Some("customer@example.com".to_string()),
        category: category.to_string(),
        priority,
        confidence,
        sentiment: Some("Neutral".to_string()),
        reply: Some("Thank you for reaching out.".to_string()),
        classified_at: None,
    }
}

pub fn successful_output(results: Vec<ClassificationResult>) -> JobOutput {
    JobOutput {
        success: true,
        emails_processed: results,
        error: None,
    }
}

/// Secrets pointing at a mock server
pub fn test_secrets(host: &str) -> Secrets {
    Secrets::from_toml_str(&format!(
        r#"
DATABRICKS_HOST = "{}"
DATABRICKS_TOKEN = "dapi-test-token"
DEEPSEEK_API_KEY = "sk-test"
DATABRICKS_JOB_ID = 1234
"#,
        host
    ))
    .unwrap()
}

/// Databricks settings with a short polling budget
pub fn fast_databricks_config(max_poll_attempts: u32) -> (DatabricksConfig, Duration) {
    let config = DatabricksConfig {
        max_poll_attempts,
        request_timeout_secs: 5,
        connect_test_timeout_secs: 5,
        ..Default::default()
    };
    (config, Duration::from_millis(5))
}

/// `runs/get` response body
pub fn run_state_response(life_cycle: &str, result: Option<&str>, message: Option<&str>) -> serde_json::Value {
    let mut state = json!({ "life_cycle_state": life_cycle });
    if let Some(result) = result {
        state["result_state"] = json!(result);
    }
    if let Some(message) = message {
        state["state_message"] = json!(message);
    }
    json!({ "run_id": 42, "state": state })
}

/// `runs/get-output` response body wrapping a job output envelope
pub fn run_output_response(envelope: serde_json::Value) -> serde_json::Value {
    json!({
        "metadata": { "run_id": 42 },
        "notebook_output": { "result": envelope.to_string(), "truncated": false }
    })
}

mock! {
    pub MailFetcher {}

    #[async_trait::async_trait]
    impl MailFetcher for MailFetcher {
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn fetch_unread(&self, max: u32) -> Result<Vec<EmailMessage>>;
    }
}

mock! {
    pub ClassificationInvoker {}

    #[async_trait::async_trait]
    impl ClassificationInvoker for ClassificationInvoker {
        async fn test_connection(&self) -> bool;
        async fn run_email_job(
            &self,
            gmail_token: &str,
            max_emails: u32,
            email_data: Option<EmailInput>,
        ) -> Result<RunId>;
        async fn get_job_result(&self, run_id: RunId, on_poll: PollCallback) -> Result<JobOutput>;
    }
}
