//! Production [`HttpClient`]: a thin `reqwest` wrapper, injected rather than a module-level
//! singleton (spec §9's "monkeypatchable HTTP calls" note — tests inject a stub instead).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{HttpClient, RouterError};

/// `reqwest`-backed [`HttpClient`]. One instance is shared across every provider call; the
/// per-call timeout is enforced per request, not baked into the client.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// # Panics
    ///
    /// Panics if the underlying `reqwest` client cannot be constructed (e.g. TLS backend
    /// initialization failure), matching `reqwest::Client::new`'s own panicking behavior.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_json(
        &self,
        url: &str,
        bearer_token: &str,
        body: Value,
        timeout_ms: u64,
    ) -> Result<(u16, Value), RouterError> {
        let request = self
            .client
            .post(url)
            .bearer_auth(bearer_token)
            .json(&body)
            .timeout(Duration::from_millis(timeout_ms));

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RouterError::Timeout(timeout_ms)
            } else {
                RouterError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let value = response
            .json::<Value>()
            .await
            .unwrap_or_else(|_| Value::String(String::new()));
        Ok((status, value))
    }
}
