//! Gmail mail fetcher with bounded concurrency and retry logic

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use google_gmail1::api::Message;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{GmailHub, GMAIL_SCOPES};
use crate::config::GmailConfig;
use crate::error::{ClassifierError, Result};
use crate::models::EmailMessage;

/// Label info returned from Gmail API
#[derive(Debug, Clone)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// Mailbox operations the presentation layer depends on
#[async_trait]
pub trait MailFetcher: Send + Sync {
    /// List the account's labels; doubles as a connectivity check
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Fetch up to `max` messages matching the configured label and query
    async fn fetch_unread(&self, max: u32) -> Result<Vec<EmailMessage>>;
}

/// Gmail client backed by the google-gmail1 hub
pub struct GmailFetcher {
    hub: GmailHub,
    label: String,
    query: String,
    max_concurrent: usize,
}

impl GmailFetcher {
    pub fn new(hub: GmailHub, config: &GmailConfig) -> Self {
        Self {
            hub,
            label: config.label.clone(),
            query: config.query.clone(),
            max_concurrent: config.max_concurrent_requests,
        }
    }

    async fn list_message_ids(&self, max: u32) -> Result<Vec<String>> {
        let mut all_ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = max.saturating_sub(all_ids.len() as u32);
            if remaining == 0 {
                break;
            }

            let page = page_token.as_deref();
            let response = with_retry("list_messages", 3, Duration::from_secs(1), || async move {
                let mut call = self
                    .hub
                    .users()
                    .messages_list("me")
                    .q(&self.query)
                    .add_label_ids(&self.label)
                    .max_results(remaining);

                if let Some(token) = page {
                    call = call.page_token(token);
                }

                let (_, response) = call.add_scope(GMAIL_SCOPES[0]).doit().await?;
                Ok(response)
            })
            .await?;

            all_ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        all_ids.truncate(max as usize);
        debug!("Listed {} message ids", all_ids.len());
        Ok(all_ids)
    }

    async fn get_message(&self, id: &str) -> Result<EmailMessage> {
        let id = id.to_string();
        with_retry("get_message", 3, Duration::from_secs(1), || async {
            let (_, msg) = self
                .hub
                .users()
                .messages_get("me", &id)
                .format("metadata")
                .add_metadata_headers("From")
                .add_metadata_headers("Subject")
                .add_metadata_headers("Date")
                .add_scope(GMAIL_SCOPES[0])
                .doit()
                .await?;
            parse_message(msg)
        })
        .await
    }
}

#[async_trait]
impl MailFetcher for GmailFetcher {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        with_retry("list_labels", 3, Duration::from_secs(1), || async {
            let timeout_duration = Duration::from_secs(30);
            let api_call = self
                .hub
                .users()
                .labels_list("me")
                .add_scope(GMAIL_SCOPES[0])
                .doit();

            let (_, response) = match tokio::time::timeout(timeout_duration, api_call).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("Gmail list_labels call timed out after {:?}", timeout_duration);
                    return Err(ClassifierError::NetworkError(format!(
                        "API call timed out after {:?}",
                        timeout_duration
                    )));
                }
            };

            Ok(response
                .labels
                .unwrap_or_default()
                .into_iter()
                .filter_map(|label| match (label.id, label.name) {
                    (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                    _ => None,
                })
                .collect())
        })
        .await
    }

    async fn fetch_unread(&self, max: u32) -> Result<Vec<EmailMessage>> {
        let ids = self.list_message_ids(max).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // `buffered` keeps list order while bounding in-flight requests
        stream::iter(ids)
            .map(|id| async move { self.get_message(&id).await })
            .buffered(self.max_concurrent.max(1))
            .try_collect()
            .await
    }
}

/// Check if an error is retryable
fn should_retry(error: &ClassifierError) -> bool {
    error.is_transient()
}

/// How long to wait before the next attempt
///
/// Rate-limit responses wait at least as long as the server asked for.
fn retry_delay(error: &ClassifierError, backoff: Duration) -> Duration {
    match error {
        ClassifierError::RateLimitExceeded { retry_after } => {
            backoff.max(Duration::from_secs(*retry_after))
        }
        _ => backoff,
    }
}

/// Execute an async operation with exponential backoff retry
///
/// The delay doubles after each failed attempt and is capped at 30 seconds.
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    max_retries: u32,
    initial_delay: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if should_retry(&e) && attempts <= max_retries => {
                let wait = retry_delay(&e, delay);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name,
                    attempts,
                    max_retries + 1,
                    e,
                    wait
                );
                tokio::time::sleep(wait).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Convert a Gmail API message into an EmailMessage
pub fn parse_message(msg: Message) -> Result<EmailMessage> {
    let id = msg
        .id
        .ok_or_else(|| ClassifierError::InvalidResponse("Missing message ID".to_string()))?;

    let mut from = String::new();
    let mut subject = String::new();
    let mut date_str = String::new();

    let headers = msg
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_ref())
        .map(|h| h.as_slice())
        .unwrap_or_default();

    for header in headers {
        if let (Some(name), Some(value)) = (&header.name, &header.value) {
            match name.to_lowercase().as_str() {
                "from" => from = value.clone(),
                "subject" => subject = value.clone(),
                "date" => date_str = value.clone(),
                _ => {}
            }
        }
    }

    let (sender_name, sender_email) =
        parse_email_header(&from).unwrap_or_else(|| (String::new(), from.trim().to_string()));

    let date = parse_date(&date_str)
        .ok()
        .or_else(|| msg.internal_date.and_then(DateTime::from_timestamp_millis))
        .unwrap_or_else(Utc::now);

    Ok(EmailMessage {
        id,
        thread_id: msg.thread_id.unwrap_or_default(),
        from,
        sender_name,
        sender_email,
        subject,
        date,
        snippet: msg.snippet.unwrap_or_default(),
        labels: msg.label_ids.unwrap_or_default(),
    })
}

/// Parse email header in "Name <email@example.com>" format
fn parse_email_header(header: &str) -> Option<(String, String)> {
    let start = header.find('<')?;
    let end = header.rfind('>')?;
    if end <= start {
        return None;
    }
    let name = header[..start].trim().trim_matches('"').to_string();
    let email = header[start + 1..end].trim().to_string();
    Some((name, email))
}

/// Parse RFC 2822 date string, falling back to RFC 3339
fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| DateTime::parse_from_rfc3339(date_str).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| ClassifierError::InvalidResponse(format!("Invalid date format: {}", e)))
}
