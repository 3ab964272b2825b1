//! Gmail access-token resolution and Gmail API hub construction

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::path::Path;
use yup_oauth2::ApplicationSecret;

use crate::error::{ClassifierError, Result};

/// Read-only scope; the classification job only reads mail
pub const GMAIL_SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.readonly"];

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Where a resolved Gmail access token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Passed on the command line or via `GMAIL_ACCESS_TOKEN`
    Explicit,
    /// Refreshed from the OAuth token cache
    Cached,
}

/// Pick the Gmail access token to use for this invocation
///
/// An explicit, non-blank token wins. Otherwise a previously cached OAuth
/// token is refreshed silently. Without either, the caller must run `auth`.
pub async fn resolve_gmail_token(
    explicit: Option<&str>,
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<(String, TokenSource)> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        tracing::debug!("Using explicitly provided Gmail access token");
        return Ok((token.to_string(), TokenSource::Explicit));
    }

    if token_cache_path.exists() {
        tracing::debug!("Refreshing Gmail access token from {:?}", token_cache_path);
        let token = authorize(credentials_path, token_cache_path).await?;
        return Ok((token, TokenSource::Cached));
    }

    Err(ClassifierError::MissingGmailToken(
        "pass --gmail-token, set GMAIL_ACCESS_TOKEN, or run `email-classifier auth`".to_string(),
    ))
}

/// Run the installed-app OAuth flow and return a Gmail access token
///
/// Tokens are persisted to `token_cache_path`, so subsequent calls refresh
/// without opening a browser.
pub async fn authorize(credentials_path: &Path, token_cache_path: &Path) -> Result<String> {
    let secret = if credentials_path.exists() {
        yup_oauth2::read_application_secret(credentials_path)
            .await
            .map_err(|e| ClassifierError::AuthError(format!("Failed to read credentials: {}", e)))?
    } else {
        tracing::debug!(
            "{:?} not found, reading OAuth client from environment",
            credentials_path
        );
        load_credentials_from_env()?
    };

    if let Some(parent) = token_cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| ClassifierError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    let token = auth
        .token(GMAIL_SCOPES)
        .await
        .map_err(|e| ClassifierError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_file(token_cache_path).await?;
    }

    token
        .token()
        .map(str::to_string)
        .ok_or_else(|| ClassifierError::AuthError("OAuth flow returned no access token".to_string()))
}

/// Build a Gmail API hub that authenticates with a bearer access token
pub fn build_gmail_hub(access_token: String) -> Result<GmailHub> {
    // HTTP/1 for compatibility with google-gmail1
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| ClassifierError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, access_token))
}

/// Load the OAuth client from environment variables
///
/// # Environment Variables
/// - `GMAIL_CLIENT_ID`: OAuth2 client ID
/// - `GMAIL_CLIENT_SECRET`: OAuth2 client secret
/// - `GMAIL_REDIRECT_URI`: Redirect URI (optional, defaults to http://localhost:8080)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| ClassifierError::ConfigError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| ClassifierError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri =
        env::var("GMAIL_REDIRECT_URI").unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict a file holding tokens or secrets to its owner (0600)
#[cfg(unix)]
pub async fn secure_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs rather than mode bits; nothing to do here
#[cfg(windows)]
pub async fn secure_file(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_explicit_token_wins() {
        let (token, source) = resolve_gmail_token(
            Some("  ya29.token  "),
            Path::new("/tmp/none-credentials.json"),
            Path::new("/tmp/none-token-cache.json"),
        )
        .await
        .unwrap();

        assert_eq!(token, "ya29.token");
        assert_eq!(source, TokenSource::Explicit);
    }

    #[tokio::test]
    async fn test_blank_token_without_cache_is_missing() {
        let result = resolve_gmail_token(
            Some("   "),
            Path::new("/tmp/none-credentials.json"),
            Path::new("/tmp/nonexistent-token-cache-12345.json"),
        )
        .await;

        assert!(matches!(result, Err(ClassifierError::MissingGmailToken(_))));
    }

    #[tokio::test]
    async fn test_secure_file() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "token").await.unwrap();

        secure_file(temp_file.path()).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = tokio::fs::metadata(temp_file.path()).await.unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    #[serial]
    fn test_load_credentials_from_env() {
        env::set_var("GMAIL_CLIENT_ID", "test-id");
        env::set_var("GMAIL_CLIENT_SECRET", "test-secret");
        env::set_var("GMAIL_REDIRECT_URI", "http://localhost:9999");

        let secret = load_credentials_from_env().unwrap();
        assert_eq!(secret.client_id, "test-id");
        assert_eq!(secret.client_secret, "test-secret");
        assert_eq!(secret.redirect_uris[0], "http://localhost:9999");

        env::remove_var("GMAIL_CLIENT_ID");
        env::remove_var("GMAIL_CLIENT_SECRET");
        env::remove_var("GMAIL_REDIRECT_URI");
    }

    #[test]
    #[serial]
    fn test_load_credentials_from_env_missing() {
        env::remove_var("GMAIL_CLIENT_ID");
        env::remove_var("GMAIL_CLIENT_SECRET");

        let err = load_credentials_from_env().unwrap_err();
        assert!(err.to_string().contains("GMAIL_CLIENT_ID not set"));
    }

    #[test]
    fn test_scopes_are_read_only() {
        assert_eq!(GMAIL_SCOPES, &["https://www.googleapis.com/auth/gmail.readonly"]);
    }
}
