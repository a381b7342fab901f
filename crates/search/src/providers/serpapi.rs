//! SerpApi search provider.
//!
//! SerpApi fronts several engines (google, bing, duckduckgo, ...) behind one
//! JSON API; the engine is selected per backend instance.

use crate::client::{SearchBackend, SearchHit};
use frag_core::{AppResult, BackendError};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://serpapi.com/search";

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    position: Option<u32>,
}

/// SerpApi-backed search backend.
pub struct SerpApiBackend {
    name: String,
    engine: String,
    api_key: String,
    endpoint: String,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl SerpApiBackend {
    /// Create a backend for the given engine.
    pub fn new(name: impl Into<String>, engine: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine: engine.into(),
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: None,
            client: reqwest::Client::new(),
        }
    }

    /// Use a custom endpoint (e.g., a caching proxy).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Apply an HTTP timeout to every request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    /// Convert a SerpApi payload into ranked hits.
    fn convert_response(&self, response: SerpApiResponse, k: usize) -> Result<Vec<SearchHit>, BackendError> {
        if let Some(error) = response.error {
            // SerpApi reports an exhausted query as an error string
            if error.contains("hasn't returned any results") {
                return Ok(Vec::new());
            }
            if error.to_lowercase().contains("run out of searches") {
                return Err(BackendError::rate_limited(&self.name));
            }
            return Err(BackendError::unavailable(&self.name, error));
        }

        let hits = response
            .organic_results
            .into_iter()
            .filter(|r| !r.link.is_empty() && !r.snippet.trim().is_empty())
            .enumerate()
            .map(|(i, r)| SearchHit {
                source_id: r.link,
                title: r.title,
                snippet: r.snippet,
                rank: r.position.unwrap_or(i as u32 + 1),
            })
            .take(k)
            .collect();

        Ok(hits)
    }

    fn classify(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            let timeout_ms = self.timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
            BackendError::timeout(&self.name, timeout_ms)
        } else {
            BackendError::unavailable(&self.name, err.to_string())
        }
    }
}

#[async_trait::async_trait]
impl SearchBackend for SerpApiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<SearchHit>> {
        tracing::debug!(backend = %self.name, engine = %self.engine, "Searching: {}", query);

        let num = k.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("engine", self.engine.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::rate_limited(&self.name).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::unavailable(&self.name, format!("HTTP {}: {}", status, body)).into());
        }

        let payload: SerpApiResponse = response.json().await.map_err(|e| {
            BackendError::malformed(&self.name, format!("Failed to parse response: {}", e))
        })?;

        let hits = self.convert_response(payload, k)?;
        tracing::debug!(backend = %self.name, "Received {} hits", hits.len());
        Ok(hits)
    }
}
