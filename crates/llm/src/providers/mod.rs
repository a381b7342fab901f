//! Generation provider implementations.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use frag_core::BackendError;
use std::time::Duration;

/// Build an HTTP client with an optional request timeout.
pub(crate) fn http_client(timeout: Option<Duration>) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().unwrap_or_else(|e| {
        tracing::warn!("Falling back to default HTTP client: {}", e);
        reqwest::Client::new()
    })
}

/// Map a transport error to the backend taxonomy.
pub(crate) fn classify_send_error(
    backend: &str,
    err: reqwest::Error,
    timeout: Option<Duration>,
) -> BackendError {
    if err.is_timeout() {
        let timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
        BackendError::timeout(backend, timeout_ms)
    } else if err.is_decode() {
        BackendError::malformed(backend, err.to_string())
    } else {
        BackendError::unavailable(backend, err.to_string())
    }
}

/// Map a non-success HTTP status to the backend taxonomy.
pub(crate) fn classify_status(
    backend: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> BackendError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        BackendError::rate_limited(backend)
    } else {
        BackendError::unavailable(backend, format!("HTTP {}: {}", status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        let err = classify_status("ollama", reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(err.kind(), "rate_limited");

        let err = classify_status("ollama", reqwest::StatusCode::BAD_GATEWAY, "upstream");
        assert_eq!(err.kind(), "unavailable");
        assert!(err.to_string().contains("upstream"));
    }
}
