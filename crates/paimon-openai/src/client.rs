//! Shared HTTP plumbing.

use std::time::Duration;

use paimon_core::{Error, Result};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

const BACKEND: &str = "openai";

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Base URL, including any version prefix (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
    /// Bearer token. Omitted from requests when unset or empty.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

/// HTTP client bound to one endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::invalid_config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout,
        })
    }

    /// Returns the endpoint base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POSTs a JSON body to `path` and returns the successful response.
    ///
    /// # Errors
    ///
    /// Maps transport failures and non-2xx statuses onto [`Error`].
    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(url = %url, "Sending request");

        let response = request.send().await.map_err(|e| self.map_transport(&e))?;
        check_status(response).await
    }

    /// Maps a reqwest failure onto [`Error`].
    pub(crate) fn map_transport(&self, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                duration: self.timeout,
            }
        } else {
            Error::backend(BACKEND, err.to_string())
        }
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(1);
        return Err(Error::RateLimited {
            retry_after: Duration::from_secs(retry_after),
        });
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = %status, body = %body, "Backend returned an error");
    Err(Error::backend(BACKEND, format!("HTTP {status}: {body}")))
}
