//! Email Classifier
//!
//! Classifies customer emails by delegating to a Databricks job that reads
//! Gmail and calls DeepSeek, then keeps the results for review and analytics.
//!
//! # Overview
//!
//! - **Secrets**: Databricks and DeepSeek credentials from a TOML file
//! - **Gmail**: OAuth token resolution and unread message fetching
//! - **Databricks**: job submission, polling and output decoding
//! - **Pipeline**: the `process` and `classify` flows over service traits
//! - **Session**: classification history persisted between runs
//! - **Analytics**: category and priority statistics
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use email_classifier::{config::Config, pipeline, secrets::Secrets, DatabricksClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let secrets = Secrets::load("secrets.toml".as_ref()).await?;
//!     let client = DatabricksClient::new(secrets, &config.databricks)?;
//!
//!     let results = pipeline::process_emails(
//!         &client,
//!         "ya29.gmail-access-token",
//!         3,
//!         Arc::new(pipeline::NoopObserver),
//!     )
//!     .await?;
//!     println!("Classified {} emails", results.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`analytics`] - Aggregate statistics and bar charts
//! - [`auth`] - Gmail token resolution, OAuth2 flow and API hub
//! - [`cli`] - Command-line interface and command handlers
//! - [`config`] - Configuration management
//! - [`databricks`] - Databricks Jobs API client
//! - [`deepseek`] - DeepSeek connectivity check
//! - [`error`] - Error types and result aliases
//! - [`gmail`] - Unread message fetching with retry
//! - [`models`] - Core data structures
//! - [`pipeline`] - Classification flows
//! - [`secrets`] - Credential store
//! - [`session`] - Persistent classification history

pub mod analytics;
pub mod auth;
pub mod cli;
pub mod config;
pub mod databricks;
pub mod deepseek;
pub mod error;
pub mod gmail;
pub mod models;
pub mod pipeline;
pub mod secrets;
pub mod session;

// Re-export commonly used types for convenience
pub use error::{ClassifierError, Result};

// Core data models
pub use models::{ClassificationResult, EmailInput, EmailMessage, JobOutput, Priority};

// Service traits and their production implementations
pub use databricks::{ClassificationInvoker, DatabricksClient, LifeCycleState, RunId};
pub use deepseek::DeepSeekClient;
pub use gmail::{GmailFetcher, MailFetcher};

// Config and credentials
pub use config::Config;
pub use secrets::Secrets;

// Session and analytics
pub use analytics::Stats;
pub use session::Session;

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};
