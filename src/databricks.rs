//! Databricks Jobs API client that runs the email classification job
//!
//! The job itself reads Gmail and calls DeepSeek; this side only submits a
//! run with the right notebook parameters, polls its life cycle and decodes
//! the notebook output.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DatabricksConfig;
use crate::error::{ClassifierError, Result};
use crate::models::{EmailInput, JobOutput};
use crate::secrets::Secrets;

/// Identifier of a single job run
pub type RunId = i64;

/// Called after every status poll with the attempt number and observed state
pub type PollCallback = Arc<dyn Fn(u32, LifeCycleState) + Send + Sync>;

/// Life cycle of a Databricks job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifeCycleState {
    Queued,
    Pending,
    Running,
    Terminating,
    Terminated,
    Skipped,
    InternalError,
    Blocked,
    WaitingForRetry,
    #[serde(other)]
    Unknown,
}

impl LifeCycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifeCycleState::Queued => "QUEUED",
            LifeCycleState::Pending => "PENDING",
            LifeCycleState::Running => "RUNNING",
            LifeCycleState::Terminating => "TERMINATING",
            LifeCycleState::Terminated => "TERMINATED",
            LifeCycleState::Skipped => "SKIPPED",
            LifeCycleState::InternalError => "INTERNAL_ERROR",
            LifeCycleState::Blocked => "BLOCKED",
            LifeCycleState::WaitingForRetry => "WAITING_FOR_RETRY",
            LifeCycleState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for LifeCycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunState {
    pub life_cycle_state: LifeCycleState,
    #[serde(default)]
    pub result_state: Option<String>,
    #[serde(default)]
    pub state_message: Option<String>,
}

impl RunState {
    fn message_or_unknown(&self) -> String {
        self.state_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("Unknown error")
            .to_string()
    }
}

#[derive(Deserialize)]
struct RunNowResponse {
    run_id: RunId,
}

#[derive(Deserialize)]
struct RunStatusResponse {
    state: RunState,
}

#[derive(Deserialize)]
struct RunOutputResponse {
    #[serde(default)]
    notebook_output: Option<NotebookOutput>,
}

#[derive(Deserialize)]
struct NotebookOutput {
    #[serde(default)]
    result: Option<String>,
}

/// What a single status poll concluded
enum PollStep {
    Continue,
    Done(Result<JobOutput>),
}

/// Remote classification operations the presentation layer depends on
#[async_trait]
pub trait ClassificationInvoker: Send + Sync {
    /// True when the workspace answers an authenticated request
    async fn test_connection(&self) -> bool;

    /// Start a classification run and return its run id
    async fn run_email_job(
        &self,
        gmail_token: &str,
        max_emails: u32,
        email_data: Option<EmailInput>,
    ) -> Result<RunId>;

    /// Wait for a run to finish and decode its notebook output
    async fn get_job_result(&self, run_id: RunId, on_poll: PollCallback) -> Result<JobOutput>;
}

/// Databricks REST client
pub struct DatabricksClient {
    http: reqwest::Client,
    secrets: Secrets,
    poll_interval: Duration,
    max_poll_attempts: u32,
    request_timeout: Duration,
    connect_test_timeout: Duration,
}

impl DatabricksClient {
    pub fn new(secrets: Secrets, config: &DatabricksConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("email-classifier/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            secrets,
            poll_interval: config.poll_interval(),
            max_poll_attempts: config.max_poll_attempts,
            request_timeout: config.request_timeout(),
            connect_test_timeout: config.connect_test_timeout(),
        })
    }

    /// Override the delay between status polls
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.secrets.databricks_host, path)
    }

    /// Build the `notebook_params` map handed to the job
    fn notebook_params(
        &self,
        gmail_token: &str,
        max_emails: u32,
        email_data: Option<&EmailInput>,
    ) -> Result<BTreeMap<&'static str, String>> {
        let mut params = BTreeMap::new();
        params.insert("gmail_token", gmail_token.to_string());
        params.insert("deepseek_api_key", self.secrets.deepseek_api_key.clone());
        params.insert("max_emails", max_emails.to_string());
        if let Some(email) = email_data {
            params.insert("email_data", serde_json::to_string(email)?);
        }
        Ok(params)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, run_id: RunId) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.secrets.databricks_token)
            .query(&[("run_id", run_id)])
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::from_status(
                status.as_u16(),
                &body,
                retry_after.as_deref(),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(format!("{}: {}", path, e)))
    }

    /// Fetch the current state of a run
    pub async fn get_run_state(&self, run_id: RunId) -> Result<RunState> {
        let status: RunStatusResponse = self.get_json("2.1/jobs/runs/get", run_id).await?;
        Ok(status.state)
    }

    /// Fetch and decode the notebook output of a finished run
    pub async fn get_run_output(&self, run_id: RunId) -> Result<JobOutput> {
        let output: RunOutputResponse = self.get_json("2.1/jobs/runs/get-output", run_id).await?;

        let result = output
            .notebook_output
            .and_then(|n| n.result)
            .ok_or(ClassifierError::NoJobOutput)?;

        serde_json::from_str(&result).map_err(|e| {
            ClassifierError::InvalidResponse(format!("Job output is not valid JSON: {}", e))
        })
    }

    async fn poll_once(&self, run_id: RunId, attempt: u32, on_poll: &PollCallback) -> PollStep {
        let state = match self.get_run_state(run_id).await {
            Ok(state) => state,
            Err(e @ (ClassifierError::AuthError(_) | ClassifierError::Forbidden(_))) => {
                return PollStep::Done(Err(e));
            }
            Err(e) => {
                warn!("Status check {} for run {} failed: {}", attempt, run_id, e);
                return PollStep::Continue;
            }
        };

        debug!(
            "Run {} attempt {}: {} (result: {:?})",
            run_id, attempt, state.life_cycle_state, state.result_state
        );
        on_poll(attempt, state.life_cycle_state);

        match state.life_cycle_state {
            LifeCycleState::Terminated => {
                if state.result_state.as_deref() != Some("SUCCESS") {
                    return PollStep::Done(Err(ClassifierError::JobFailed(
                        state.message_or_unknown(),
                    )));
                }
                match self.get_run_output(run_id).await {
                    Ok(output) => PollStep::Done(Ok(output)),
                    Err(e @ (ClassifierError::NoJobOutput
                    | ClassifierError::InvalidResponse(_)
                    | ClassifierError::AuthError(_)
                    | ClassifierError::Forbidden(_))) => PollStep::Done(Err(e)),
                    Err(e) => {
                        warn!("Fetching output of run {} failed: {}", run_id, e);
                        PollStep::Continue
                    }
                }
            }
            LifeCycleState::InternalError | LifeCycleState::Skipped => PollStep::Done(Err(
                ClassifierError::JobError(state.message_or_unknown()),
            )),
            _ => PollStep::Continue,
        }
    }
}

#[async_trait]
impl ClassificationInvoker for DatabricksClient {
    async fn test_connection(&self) -> bool {
        let result = self
            .http
            .get(self.url("2.0/clusters/list"))
            .bearer_auth(&self.secrets.databricks_token)
            .timeout(self.connect_test_timeout)
            .send()
            .await;

        match result {
            Ok(response) => {
                debug!("Databricks connection test returned {}", response.status());
                response.status() == reqwest::StatusCode::OK
            }
            Err(e) => {
                debug!("Databricks connection test failed: {}", e);
                false
            }
        }
    }

    async fn run_email_job(
        &self,
        gmail_token: &str,
        max_emails: u32,
        email_data: Option<EmailInput>,
    ) -> Result<RunId> {
        let job_id = self.secrets.job_id()?;
        let payload = json!({
            "job_id": job_id,
            "notebook_params": self.notebook_params(gmail_token, max_emails, email_data.as_ref())?,
        });

        info!(
            "Submitting classification job {} (max_emails={}, manual={})",
            job_id,
            max_emails,
            email_data.is_some()
        );

        let response = self
            .http
            .post(self.url("2.1/jobs/run-now"))
            .bearer_auth(&self.secrets.databricks_token)
            .json(&payload)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.trim();
            let reason = if body.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                body.to_string()
            };
            return Err(ClassifierError::JobSubmissionFailed(reason));
        }

        let run: RunNowResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(format!("run-now: {}", e)))?;

        info!("Job started: run_id={}", run.run_id);
        Ok(run.run_id)
    }

    async fn get_job_result(&self, run_id: RunId, on_poll: PollCallback) -> Result<JobOutput> {
        for attempt in 1..=self.max_poll_attempts {
            tokio::time::sleep(self.poll_interval).await;

            if let PollStep::Done(result) = self.poll_once(run_id, attempt, &on_poll).await {
                return result;
            }
        }

        warn!(
            "Run {} did not finish after {} status checks",
            run_id, self.max_poll_attempts
        );
        Err(ClassifierError::JobTimeout {
            attempts: self.max_poll_attempts,
        })
    }
}
