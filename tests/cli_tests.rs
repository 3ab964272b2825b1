//! Command handler tests against a mock workspace

use clap::Parser;
use email_classifier::cli::{self, Cli, ProgressReporter};
use email_classifier::error::ClassifierError;
use indicatif::{MultiProgress, ProgressDrawTarget};
use std::path::Path;
use tempfile::{tempdir, TempDir};
use wiremock::MockServer;

/// Write secrets pointing at `server` and a corrupt session file
fn workspace(server: &MockServer) -> TempDir {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("secrets.toml"),
        format!(
            "DATABRICKS_HOST = \"{}\"\nDATABRICKS_TOKEN = \"dapi-test-token\"\nDEEPSEEK_API_KEY = \"sk-test\"\nDATABRICKS_JOB_ID = 1234\n",
            server.uri()
        ),
    )
    .unwrap();
    std::fs::write(dir.path().join("session.json"), "{ not json").unwrap();
    dir
}

fn parse(dir: &Path, command: &[&str]) -> Cli {
    let config = dir.join("config.toml");
    let secrets = dir.join("secrets.toml");
    let session = dir.join("session.json");
    let mut args = vec![
        "email-classifier".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--secrets".to_string(),
        secrets.display().to_string(),
        "--session-file".to_string(),
        session.display().to_string(),
        "--gmail-token".to_string(),
        "ya29.test".to_string(),
    ];
    args.extend(command.iter().map(|s| s.to_string()));
    Cli::try_parse_from(args).unwrap()
}

fn hidden_reporter() -> ProgressReporter {
    ProgressReporter::with_multi_progress(MultiProgress::with_draw_target(
        ProgressDrawTarget::hidden(),
    ))
}

#[tokio::test]
async fn test_process_with_corrupt_session_submits_no_job() {
    let server = MockServer::start().await;
    let dir = workspace(&server);
    let cli = parse(dir.path(), &["process"]);

    let result = cli::run_process(&cli, Some(3), false, &hidden_reporter()).await;

    assert!(matches!(result, Err(ClassifierError::SerializationError(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_classify_with_corrupt_session_submits_no_job() {
    let server = MockServer::start().await;
    let dir = workspace(&server);
    let cli = parse(dir.path(), &["classify"]);

    let result = cli::run_classify(
        &cli,
        Some("Refund request".to_string()),
        None,
        Some("Please refund my order.".to_string()),
        &hidden_reporter(),
    )
    .await;

    assert!(matches!(result, Err(ClassifierError::SerializationError(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}
