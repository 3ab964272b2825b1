//! End-to-end flows behind the `process` and `classify` commands
//!
//! These functions only talk to the [`MailFetcher`] and
//! [`ClassificationInvoker`] traits, so the command layer can swap in the
//! real clients while tests use mocks.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{MAX_EMAIL_COUNT, MIN_EMAIL_COUNT};
use crate::databricks::{ClassificationInvoker, LifeCycleState, PollCallback, RunId};
use crate::error::{ClassifierError, Result};
use crate::gmail::MailFetcher;
use crate::models::{ClassificationResult, EmailInput, EmailMessage};

/// Receives progress notifications while a flow runs
pub trait PipelineObserver: Send + Sync {
    fn emails_fetched(&self, _count: usize) {}
    fn job_started(&self, _run_id: RunId) {}
    fn job_polled(&self, _run_id: RunId, _attempt: u32, _state: LifeCycleState) {}
}

/// Observer that ignores every notification
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Results of classifying locally fetched messages one job at a time
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub fetched: usize,
    pub results: Vec<ClassificationResult>,
    /// (subject, error) for every message whose job did not succeed
    pub failures: Vec<(String, ClassifierError)>,
    /// Messages left out because they have no subject or no body
    pub skipped: usize,
}

impl BatchOutcome {
    /// Error to report when any message could not be classified
    pub fn failure_summary(&self) -> Option<ClassifierError> {
        if self.failures.is_empty() {
            return None;
        }
        Some(ClassifierError::JobFailed(format!(
            "{} of {} emails could not be classified",
            self.failures.len(),
            self.fetched
        )))
    }
}

/// Reject counts outside the allowed range for a single run
pub fn validate_count(count: u32) -> Result<u32> {
    if !(MIN_EMAIL_COUNT..=MAX_EMAIL_COUNT).contains(&count) {
        return Err(ClassifierError::InvalidInput(format!(
            "email count must be between {} and {}, got {}",
            MIN_EMAIL_COUNT, MAX_EMAIL_COUNT, count
        )));
    }
    Ok(count)
}

fn require_token(gmail_token: &str) -> Result<&str> {
    let token = gmail_token.trim();
    if token.is_empty() {
        return Err(ClassifierError::MissingGmailToken(
            "Please enter Gmail token first".to_string(),
        ));
    }
    Ok(token)
}

async fn run_and_wait(
    invoker: &dyn ClassificationInvoker,
    gmail_token: &str,
    max_emails: u32,
    email_data: Option<EmailInput>,
    observer: Arc<dyn PipelineObserver>,
) -> Result<Vec<ClassificationResult>> {
    let run_id = invoker
        .run_email_job(gmail_token, max_emails, email_data)
        .await?;
    observer.job_started(run_id);

    let poll_observer = Arc::clone(&observer);
    let on_poll: PollCallback = Arc::new(move |attempt, state| {
        poll_observer.job_polled(run_id, attempt, state);
    });

    let output = invoker.get_job_result(run_id, on_poll).await?;
    output.into_results()
}

/// Let a single remote job read the inbox and classify up to `count` emails
pub async fn process_emails(
    invoker: &dyn ClassificationInvoker,
    gmail_token: &str,
    count: u32,
    observer: Arc<dyn PipelineObserver>,
) -> Result<Vec<ClassificationResult>> {
    let token = require_token(gmail_token)?;
    let count = validate_count(count)?;

    info!("Processing up to {} emails remotely", count);
    let results = run_and_wait(invoker, token, count, None, observer).await?;
    info!("Job returned {} classifications", results.len());
    Ok(results)
}

/// Classify a single manually entered email
///
/// The Gmail token is optional here; the job classifies `email` directly.
pub async fn classify_email(
    invoker: &dyn ClassificationInvoker,
    gmail_token: Option<&str>,
    email: EmailInput,
    observer: Arc<dyn PipelineObserver>,
) -> Result<Vec<ClassificationResult>> {
    if !email.is_complete() {
        return Err(ClassifierError::InvalidInput(
            "Please enter both subject and body".to_string(),
        ));
    }

    let token = gmail_token.map(str::trim).unwrap_or_default();
    run_and_wait(invoker, token, 1, Some(email), observer).await
}

/// Fetch unread mail here, then submit one job per message
///
/// At most `max_concurrent_runs` jobs are in flight; results keep the
/// mailbox order. A failed job is recorded and the rest continue.
/// Messages with a blank subject or body are skipped, not submitted.
pub async fn process_fetched(
    fetcher: &dyn MailFetcher,
    invoker: &dyn ClassificationInvoker,
    gmail_token: &str,
    count: u32,
    max_concurrent_runs: usize,
    observer: Arc<dyn PipelineObserver>,
) -> Result<BatchOutcome> {
    let token = require_token(gmail_token)?;
    let count = validate_count(count)?;

    let messages: Vec<EmailMessage> = fetcher.fetch_unread(count).await?;
    observer.emails_fetched(messages.len());

    if messages.is_empty() {
        info!("No unread messages to classify");
        return Ok(BatchOutcome::default());
    }

    let fetched = messages.len();
    let (inputs, incomplete): (Vec<EmailInput>, Vec<EmailInput>) = messages
        .iter()
        .map(EmailInput::from)
        .partition(EmailInput::is_complete);
    for input in &incomplete {
        warn!("Skipping message without subject or body: '{}'", input.subject);
    }

    let outcomes: Vec<(String, Result<Vec<ClassificationResult>>)> = stream::iter(inputs)
        .map(|input| {
            let observer = Arc::clone(&observer);
            async move {
                let subject = input.subject.clone();
                let outcome = run_and_wait(invoker, token, 1, Some(input), observer).await;
                (subject, outcome)
            }
        })
        .buffered(max_concurrent_runs.max(1))
        .collect()
        .await;

    let mut batch = BatchOutcome {
        fetched,
        skipped: incomplete.len(),
        ..Default::default()
    };
    for (subject, outcome) in outcomes {
        match outcome {
            Ok(results) => batch.results.extend(results),
            Err(e) => {
                warn!("Classification of '{}' failed: {}", subject, e);
                batch.failures.push((subject, e));
            }
        }
    }

    info!(
        "Classified {} of {} fetched messages ({} failed, {} skipped)",
        batch.results.len(),
        batch.fetched,
        batch.failures.len(),
        batch.skipped
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_count_bounds() {
        assert_eq!(validate_count(1).unwrap(), 1);
        assert_eq!(validate_count(10).unwrap(), 10);
        assert!(validate_count(0).is_err());
        assert!(validate_count(11).unwrap_err().to_string().contains("between 1 and 10"));
    }

    #[test]
    fn test_failure_summary() {
        let mut batch = BatchOutcome {
            fetched: 3,
            ..Default::default()
        };
        assert!(batch.failure_summary().is_none());

        batch
            .failures
            .push(("Second".to_string(), ClassifierError::JobError("lost".to_string())));
        let err = batch.failure_summary().unwrap();
        assert_eq!(err.to_string(), "Job failed: 1 of 3 emails could not be classified");
    }

    #[test]
    fn test_require_token() {
        assert_eq!(require_token("  ya29  ").unwrap(), "ya29");
        let err = require_token("   ").unwrap_err();
        assert!(err.to_string().contains("Please enter Gmail token first"));
    }
}
