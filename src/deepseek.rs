//! DeepSeek API reachability check
//!
//! Classification calls to DeepSeek happen inside the Databricks job; the
//! CLI only verifies that the configured key is accepted.

use std::time::Duration;
use tracing::debug;

use crate::config::DeepSeekConfig;
use crate::error::Result;

const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DeepSeekClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DeepSeekClient {
    pub fn new(api_key: impl Into<String>, config: &DeepSeekConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("email-classifier/", env!("CARGO_PKG_VERSION")))
            .timeout(CONNECTION_TEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// True when `GET /models` answers 200 for the configured key
    pub async fn test_connection(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self.http.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(response) => {
                debug!("DeepSeek connection test returned {}", response.status());
                response.status() == reqwest::StatusCode::OK
            }
            Err(e) => {
                debug!("DeepSeek connection test failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, key: &str) -> DeepSeekClient {
        let config = DeepSeekConfig {
            base_url: format!("{}/", server.uri()),
        };
        DeepSeekClient::new(key, &config).unwrap()
    }

    #[tokio::test]
    async fn test_connection_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Bearer sk-good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "data": [{"id": "deepseek-chat", "object": "model"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client_for(&server, "sk-good").test_connection().await);
    }

    #[tokio::test]
    async fn test_connection_rejected_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert!(!client_for(&server, "sk-bad").test_connection().await);
    }

    #[tokio::test]
    async fn test_connection_unreachable() {
        let config = DeepSeekConfig {
            base_url: "http://127.0.0.1:1".to_string(),
        };
        let client = DeepSeekClient::new("sk", &config).unwrap();
        assert!(!client.test_connection().await);
    }
}
