//! Command-line interface

use clap::{Parser, Subcommand};
use crossterm::style::{StyledContent, Stylize};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::analytics::Stats;
use crate::auth::{self, TokenSource, GMAIL_SCOPES};
use crate::config::{Config, MAX_EMAIL_COUNT, MIN_EMAIL_COUNT};
use crate::databricks::{ClassificationInvoker, DatabricksClient, LifeCycleState, RunId};
use crate::deepseek::DeepSeekClient;
use crate::error::{ClassifierError, Result};
use crate::gmail::{GmailFetcher, MailFetcher};
use crate::models::{format_confidence, ClassificationResult, EmailInput, Priority};
use crate::pipeline::{self, PipelineObserver};
use crate::secrets::Secrets;
use crate::session::Session;

#[derive(Parser, Debug)]
#[command(name = "email-classifier")]
#[command(version)]
#[command(about = "Classify customer emails with a Databricks job backed by DeepSeek", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to secrets file (DATABRICKS_HOST, DATABRICKS_TOKEN, DEEPSEEK_API_KEY)
    #[arg(long, global = true, default_value = "secrets.toml")]
    pub secrets: PathBuf,

    /// Path to session file holding classification history
    #[arg(long, global = true, default_value = ".email-classifier/session.json")]
    pub session_file: PathBuf,

    /// Gmail OAuth access token
    #[arg(long, global = true, env = "GMAIL_ACCESS_TOKEN", hide_env_values = true)]
    pub gmail_token: Option<String>,

    /// Path to OAuth2 credentials file
    #[arg(long, global = true, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, global = true, default_value = ".email-classifier/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Test connectivity to Databricks, Gmail and DeepSeek
    Check {
        /// Test the Databricks workspace
        #[arg(long)]
        databricks: bool,

        /// Test the Gmail API
        #[arg(long)]
        gmail: bool,

        /// Test the DeepSeek API
        #[arg(long)]
        deepseek: bool,
    },

    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// List unread inbox messages
    Inbox {
        /// Number of messages to list
        #[arg(short = 'n', long, value_parser = email_count)]
        count: Option<u32>,
    },

    /// Classify unread emails through the Databricks job
    Process {
        /// Number of emails to process
        #[arg(short = 'n', long, value_parser = email_count)]
        count: Option<u32>,

        /// Fetch messages here and submit one job per message
        #[arg(long)]
        fetch_locally: bool,
    },

    /// Classify a single email entered by hand
    Classify {
        /// Email subject
        #[arg(long)]
        subject: Option<String>,

        /// Sender address (defaults to customer@example.com)
        #[arg(long)]
        from: Option<String>,

        /// Email body
        #[arg(long)]
        body: Option<String>,
    },

    /// Show recent classifications, newest first
    History {
        /// Number of classifications to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show analytics over all classifications in the session
    Stats,

    /// Remove all classifications from the session
    Clear,

    /// Generate example configuration file
    InitConfig {
        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Generate a secrets template
    InitSecrets {
        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

fn email_count(value: &str) -> std::result::Result<u32, String> {
    let count: u32 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if !(MIN_EMAIL_COUNT..=MAX_EMAIL_COUNT).contains(&count) {
        return Err(format!(
            "must be between {} and {}",
            MIN_EMAIL_COUNT, MAX_EMAIL_COUNT
        ));
    }
    Ok(count)
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    /// Share the MultiProgress that the log writer prints through
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        // Use {elapsed} for human-readable format (e.g., "1s", "234ms")
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        self.println(&format!("  ✓ {}", msg));
    }

    pub fn fail_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        self.println(&format!("  ✗ {}", msg));
    }

    /// Print above any active spinners
    pub fn println(&self, msg: &str) {
        if self.multi.println(msg).is_err() {
            println!("{}", msg);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }
}

/// Mirrors job progress onto a spinner
struct SpinnerObserver {
    spinner: ProgressBar,
    multi: MultiProgress,
}

impl PipelineObserver for SpinnerObserver {
    fn emails_fetched(&self, count: usize) {
        let _ = self
            .multi
            .println(format!("  ✓ Fetched {} unread emails", count));
        self.spinner
            .set_message(format!("Classifying {} emails...", count));
    }

    fn job_started(&self, run_id: RunId) {
        let _ = self.multi.println("  ✓ Job started successfully!");
        let _ = self.multi.println(format!("    Job Run ID: {}", run_id));
    }

    fn job_polled(&self, run_id: RunId, attempt: u32, state: LifeCycleState) {
        self.spinner.set_message(format!(
            "Waiting for run {} ({}, check {})...",
            run_id, state, attempt
        ));
    }
}

/// Coloured priority label: High red, Medium yellow, Low green
pub fn priority_badge(priority: Priority) -> StyledContent<String> {
    let label = priority.to_string();
    match priority {
        Priority::High => label.red().bold(),
        Priority::Medium => label.yellow().bold(),
        Priority::Low => label.green().bold(),
        Priority::Unknown => label.dark_grey(),
    }
}

/// Summary line shown under each classification card
pub fn card_details(result: &ClassificationResult) -> String {
    format!(
        "Category: {} • Sentiment: {} • Confidence: {}",
        result.category,
        result.sentiment_display(),
        format_confidence(result.confidence)
    )
}

fn print_card(result: &ClassificationResult) {
    println!("┌ {}", truncate_string(&result.subject, 70).bold());
    println!("│ From: {}", result.sender_display());
    println!("│ Priority: {}", priority_badge(result.priority));
    println!("└ {}", card_details(result));
}

fn print_classification(result: &ClassificationResult) {
    println!();
    println!("Category:   {}", result.category.as_str().bold());
    println!("Priority:   {}", priority_badge(result.priority));
    println!("Confidence: {}", format_confidence(result.confidence));
    println!("Sentiment:  {}", result.sentiment_display());

    if let Some(reply) = result.reply.as_deref().filter(|r| !r.trim().is_empty()) {
        println!();
        println!("{}", "AI Reply".bold());
        for line in reply.lines() {
            println!("  {}", line);
        }
    }
}

/// Resolve the Gmail token, or `None` when the user has not provided one
async fn optional_gmail_token(cli: &Cli) -> Result<Option<String>> {
    match auth::resolve_gmail_token(cli.gmail_token.as_deref(), &cli.credentials, &cli.token_cache)
        .await
    {
        Ok((token, source)) => {
            if source == TokenSource::Cached {
                info!("Using cached Gmail token from {:?}", cli.token_cache);
            }
            Ok(Some(token))
        }
        Err(ClassifierError::MissingGmailToken(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn required_gmail_token(cli: &Cli) -> Result<String> {
    optional_gmail_token(cli).await?.ok_or_else(|| {
        ClassifierError::MissingGmailToken("Please enter Gmail token first".to_string())
    })
}

async fn databricks_client(cli: &Cli, config: &Config) -> Result<DatabricksClient> {
    let secrets = Secrets::load(&cli.secrets).await?;
    DatabricksClient::new(secrets, &config.databricks)
}

fn status_line(service: &str, connected: bool) -> String {
    if connected {
        format!("{:<12} ✅ Connected", service)
    } else {
        format!("{:<12} ❌ Failed", service)
    }
}

/// Run the selected connection tests, all of them when none is selected
pub async fn run_check(
    cli: &Cli,
    databricks: bool,
    gmail: bool,
    deepseek: bool,
    reporter: &ProgressReporter,
) -> Result<()> {
    let all = !(databricks || gmail || deepseek);
    let config = Config::load(&cli.config).await?;

    if all || databricks {
        let spinner = reporter.add_spinner("Testing Databricks connection...");
        let connected = match databricks_client(cli, &config).await {
            Ok(client) => client.test_connection().await,
            Err(e) => {
                reporter.println(&format!("  Databricks: {}", e));
                false
            }
        };
        spinner.finish_and_clear();
        reporter.println(&status_line("Databricks", connected));
    }

    if all || gmail {
        match optional_gmail_token(cli).await? {
            None => reporter.println(&format!("{:<12} Enter token first", "Gmail")),
            Some(token) => {
                let spinner = reporter.add_spinner("Testing Gmail connection...");
                let fetcher = GmailFetcher::new(auth::build_gmail_hub(token)?, &config.gmail);
                let connected = match fetcher.list_labels().await {
                    Ok(labels) => {
                        info!("Gmail returned {} labels", labels.len());
                        true
                    }
                    Err(e) => {
                        info!("Gmail connection test failed: {}", e);
                        false
                    }
                };
                spinner.finish_and_clear();
                reporter.println(&status_line("Gmail", connected));
            }
        }
    }

    if all || deepseek {
        let spinner = reporter.add_spinner("Testing DeepSeek connection...");
        let connected = match Secrets::load(&cli.secrets).await {
            Ok(secrets) => {
                DeepSeekClient::new(secrets.deepseek_api_key, &config.deepseek)?
                    .test_connection()
                    .await
            }
            Err(e) => {
                reporter.println(&format!("  DeepSeek: {}", e));
                false
            }
        };
        spinner.finish_and_clear();
        reporter.println(&status_line("DeepSeek", connected));
    }

    Ok(())
}

/// Run the OAuth flow and report the connected account
pub async fn run_auth(cli: &Cli, force: bool) -> Result<()> {
    if force && cli.token_cache.exists() {
        tokio::fs::remove_file(&cli.token_cache).await?;
        info!("Removed existing token cache");
    }

    let token = auth::authorize(&cli.credentials, &cli.token_cache).await?;
    println!("Successfully authenticated with Gmail API");
    println!("Token cached at: {:?}", cli.token_cache);

    let hub = auth::build_gmail_hub(token)?;
    let (_, profile) = hub
        .users()
        .get_profile("me")
        .add_scope(GMAIL_SCOPES[0])
        .doit()
        .await?;
    println!(
        "Connected to account: {}",
        profile.email_address.unwrap_or_default()
    );

    Ok(())
}

/// List unread messages without classifying them
pub async fn run_inbox(cli: &Cli, count: Option<u32>, reporter: &ProgressReporter) -> Result<()> {
    let config = Config::load(&cli.config).await?;
    let count = count.unwrap_or(config.gmail.default_email_count);
    let token = required_gmail_token(cli).await?;

    let spinner = reporter.add_spinner("Fetching unread emails...");
    let fetcher = GmailFetcher::new(auth::build_gmail_hub(token)?, &config.gmail);
    let messages = match fetcher.fetch_unread(count).await {
        Ok(messages) => messages,
        Err(e) => {
            reporter.fail_spinner(&spinner, "Fetching unread emails failed");
            return Err(e);
        }
    };
    reporter.finish_spinner(&spinner, &format!("Fetched {} unread emails", messages.len()));

    if messages.is_empty() {
        println!("No unread emails.");
        return Ok(());
    }

    for message in &messages {
        let sender = if message.sender_name.is_empty() {
            message.sender_email.as_str()
        } else {
            message.sender_name.as_str()
        };
        println!(
            "{}  {:<28}  {}",
            message.date.format("%Y-%m-%d %H:%M"),
            truncate_string(sender, 28),
            truncate_string(&message.subject, 60)
        );
    }

    Ok(())
}

/// Classify unread mail and record the results in the session
pub async fn run_process(
    cli: &Cli,
    count: Option<u32>,
    fetch_locally: bool,
    reporter: &ProgressReporter,
) -> Result<()> {
    let config = Config::load(&cli.config).await?;
    let count = count.unwrap_or(config.gmail.default_email_count);
    let token = required_gmail_token(cli).await?;
    let client = databricks_client(cli, &config).await?;
    // Loaded up front so a broken session file fails before any job runs
    let mut session = Session::load(&cli.session_file).await?;

    let spinner = reporter.add_spinner(&format!("Processing {} emails...", count));
    let observer: Arc<dyn PipelineObserver> = Arc::new(SpinnerObserver {
        spinner: spinner.clone(),
        multi: reporter.multi.clone(),
    });

    let outcome = if fetch_locally {
        let fetcher = GmailFetcher::new(auth::build_gmail_hub(token.clone())?, &config.gmail);
        pipeline::process_fetched(
            &fetcher,
            &client,
            &token,
            count,
            config.databricks.max_concurrent_runs,
            observer,
        )
        .await
        .map(|batch| {
            if batch.skipped > 0 {
                reporter.println(&format!(
                    "  Skipped {} emails without subject or body",
                    batch.skipped
                ));
            }
            for (subject, error) in &batch.failures {
                reporter.println(&format!("  ✗ {}: {}", truncate_string(subject, 50), error));
            }
            let failure = batch.failure_summary();
            (batch.results, failure)
        })
    } else {
        pipeline::process_emails(&client, &token, count, observer)
            .await
            .map(|results| (results, None))
    };

    let (results, failure) = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            reporter.fail_spinner(&spinner, "Processing failed");
            return Err(e);
        }
    };

    if results.is_empty() {
        return match failure {
            Some(e) => {
                reporter.fail_spinner(&spinner, "Processing failed");
                Err(e)
            }
            None => {
                reporter.finish_spinner(&spinner, "No emails found or processed");
                Ok(())
            }
        };
    }
    reporter.finish_spinner(&spinner, &format!("Processed {} emails!", results.len()));

    session.extend(results.iter().cloned());
    session.save(&cli.session_file).await?;

    for result in &results {
        println!();
        print_card(result);
    }

    // Partial failures still exit non-zero once the successes are saved
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn prompt_text(label: &str, default: Option<&str>) -> Result<String> {
    let mut prompt = inquire::Text::new(label);
    if let Some(default) = default {
        prompt = prompt.with_default(default);
    }
    prompt.prompt().map_err(|e| match e {
        inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted => {
            ClassifierError::OperationCancelled("input aborted".to_string())
        }
        other => ClassifierError::InvalidInput(other.to_string()),
    })
}

/// Fill in any missing field interactively when attached to a terminal
fn collect_email_input(
    subject: Option<String>,
    from: Option<String>,
    body: Option<String>,
) -> Result<EmailInput> {
    let interactive = std::io::stdin().is_terminal();
    let missing = subject.is_none() || body.is_none();

    if missing && !interactive {
        return Err(ClassifierError::InvalidInput(
            "Please enter both subject and body".to_string(),
        ));
    }

    let subject = match subject {
        Some(subject) => subject,
        None => prompt_text("Email Subject:", None)?,
    };
    let from = match from {
        Some(from) => from,
        None if interactive && missing => {
            prompt_text("From (optional):", Some(EmailInput::DEFAULT_SENDER))?
        }
        None => String::new(),
    };
    let body = match body {
        Some(body) => body,
        None => prompt_text("Email Body:", None)?,
    };

    Ok(EmailInput::new(subject, Some(&from), body))
}

/// Classify one manually entered email
pub async fn run_classify(
    cli: &Cli,
    subject: Option<String>,
    from: Option<String>,
    body: Option<String>,
    reporter: &ProgressReporter,
) -> Result<()> {
    let email = collect_email_input(subject, from, body)?;
    if !email.is_complete() {
        return Err(ClassifierError::InvalidInput(
            "Please enter both subject and body".to_string(),
        ));
    }

    let config = Config::load(&cli.config).await?;
    let client = databricks_client(cli, &config).await?;
    let token = optional_gmail_token(cli).await?;
    let mut session = Session::load(&cli.session_file).await?;

    let spinner = reporter.add_spinner("Classifying email...");
    let observer: Arc<dyn PipelineObserver> = Arc::new(SpinnerObserver {
        spinner: spinner.clone(),
        multi: reporter.multi.clone(),
    });

    let results =
        match pipeline::classify_email(&client, token.as_deref(), email, observer).await {
            Ok(results) => results,
            Err(e) => {
                reporter.fail_spinner(&spinner, "Classification failed");
                return Err(e);
            }
        };

    let Some(first) = results.first() else {
        reporter.finish_spinner(&spinner, "No emails found or processed");
        return Ok(());
    };
    reporter.finish_spinner(&spinner, "Email classified");
    print_classification(first);

    session.extend(results);
    session.save(&cli.session_file).await?;

    Ok(())
}

pub async fn run_history(cli: &Cli, limit: Option<usize>) -> Result<()> {
    let session = Session::load(&cli.session_file).await?;
    let limit = match limit {
        Some(limit) => limit,
        None => Config::load(&cli.config).await?.display.recent_limit,
    };

    if session.is_empty() {
        println!("No classifications yet. Run `email-classifier process` or `classify` first.");
        return Ok(());
    }

    println!(
        "Recent classifications ({} of {})",
        limit.min(session.len()),
        session.len()
    );
    for result in session.recent(limit) {
        println!();
        print_card(result);
    }

    Ok(())
}

pub async fn run_stats(cli: &Cli) -> Result<()> {
    let session = Session::load(&cli.session_file).await?;
    println!("{}", Stats::from_results(&session.classifications).render());
    Ok(())
}

pub async fn run_clear(cli: &Cli) -> Result<()> {
    let mut session = Session::load(&cli.session_file).await?;
    let removed = session.clear();
    session.save(&cli.session_file).await?;
    println!("Cleared {} classifications", removed);
    Ok(())
}

fn refuse_overwrite(path: &Path, force: bool, what: &str) -> Result<()> {
    if path.exists() && !force {
        return Err(ClassifierError::ConfigError(format!(
            "{} already exists at {:?}. Use --force to overwrite.",
            what, path
        )));
    }
    Ok(())
}

pub async fn run_init_config(cli: &Cli, force: bool) -> Result<()> {
    refuse_overwrite(&cli.config, force, "Configuration file")?;
    Config::create_example(&cli.config).await?;

    println!("Created example configuration file at: {:?}", cli.config);
    println!("\nKey settings to review:");
    println!("  - databricks.poll_interval_secs / max_poll_attempts: how long to wait for a job");
    println!("  - gmail.default_email_count: emails per run (1-10)");
    println!("  - databricks.max_concurrent_runs: parallel jobs with --fetch-locally");
    Ok(())
}

pub async fn run_init_secrets(cli: &Cli, force: bool) -> Result<()> {
    refuse_overwrite(&cli.secrets, force, "Secrets file")?;
    Secrets::create_template(&cli.secrets).await?;

    println!("Created secrets template at: {:?}", cli.secrets);
    println!("\nFill in DATABRICKS_HOST, DATABRICKS_TOKEN and DEEPSEEK_API_KEY,");
    println!("and DATABRICKS_JOB_ID for the classification job.");
    Ok(())
}
