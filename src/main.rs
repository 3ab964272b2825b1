use anyhow::Result;
use clap::Parser;
use email_classifier::cli::{self, Cli, Commands, ProgressReporter};
use email_classifier::error::ClassifierError;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::other("log buffer poisoned"))?;
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // On non-Windows platforms use aws-lc-rs, on Windows ring (no NASM/CMake required)
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("email_classifier=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("email_classifier=info,warn,error"))
    };

    // Logs print above spinners through the shared MultiProgress
    let multi_progress = Arc::new(MultiProgress::new());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: Arc::clone(&multi_progress),
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let reporter = ProgressReporter::with_multi_progress((*multi_progress).clone());

    match &cli.command {
        Commands::Check {
            databricks,
            gmail,
            deepseek,
        } => cli::run_check(&cli, *databricks, *gmail, *deepseek, &reporter).await?,
        Commands::Auth { force } => cli::run_auth(&cli, *force).await?,
        Commands::Inbox { count } => cli::run_inbox(&cli, *count, &reporter).await?,
        Commands::Process {
            count,
            fetch_locally,
        } => cli::run_process(&cli, *count, *fetch_locally, &reporter).await?,
        Commands::Classify {
            subject,
            from,
            body,
        } => {
            cli::run_classify(
                &cli,
                subject.clone(),
                from.clone(),
                body.clone(),
                &reporter,
            )
            .await?
        }
        Commands::History { limit } => cli::run_history(&cli, *limit).await?,
        Commands::Stats => cli::run_stats(&cli).await?,
        Commands::Clear => cli::run_clear(&cli).await?,
        Commands::InitConfig { force } => cli::run_init_config(&cli, *force).await?,
        Commands::InitSecrets { force } => cli::run_init_secrets(&cli, *force).await?,
    }

    Ok(())
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(err) = error.downcast_ref::<ClassifierError>() {
        match err {
            ClassifierError::MissingSecrets(_) => {
                eprintln!("\nHint: Add the missing keys to your secrets file.");
                eprintln!("      Run: email-classifier init-secrets");
            }
            ClassifierError::MissingGmailToken(_) => {
                eprintln!("\nHint: Pass --gmail-token, set GMAIL_ACCESS_TOKEN,");
                eprintln!("      or run: email-classifier auth");
            }
            ClassifierError::AuthError(_) | ClassifierError::Forbidden(_) => {
                eprintln!("\nHint: Check DATABRICKS_TOKEN and your Gmail token.");
                eprintln!("      Try running: email-classifier auth --force");
            }
            ClassifierError::RateLimitExceeded { retry_after } => {
                eprintln!("\nHint: You've hit an API rate limit.");
                eprintln!("      Wait {} seconds and try again.", retry_after);
            }
            ClassifierError::JobTimeout { .. } => {
                eprintln!("\nHint: The job may still be running in Databricks.");
                eprintln!("      Consider raising databricks.max_poll_attempts in config.");
            }
            ClassifierError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: email-classifier init-config --force");
            }
            _ => {}
        }
    }
}
