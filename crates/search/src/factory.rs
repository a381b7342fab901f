//! Search backend factory.

use crate::client::SearchBackend;
use crate::providers::SerpApiBackend;
use std::sync::Arc;
use std::time::Duration;

/// Create a search backend.
///
/// # Arguments
/// * `kind` - Provider kind ("serpapi")
/// * `name` - Backend name used in reports
/// * `engine` - Engine selector (defaults to the backend name)
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Provider API key
/// * `timeout` - Optional HTTP timeout
pub fn create_backend(
    kind: &str,
    name: &str,
    engine: Option<&str>,
    endpoint: Option<&str>,
    api_key: Option<&str>,
    timeout: Option<Duration>,
) -> Result<Arc<dyn SearchBackend>, String> {
    match kind.to_lowercase().as_str() {
        "serpapi" => {
            let api_key =
                api_key.ok_or_else(|| format!("Search backend '{}' requires an API key", name))?;
            let mut backend = SerpApiBackend::new(name, engine.unwrap_or(name), api_key);
            if let Some(endpoint) = endpoint {
                backend = backend.with_endpoint(endpoint);
            }
            if let Some(timeout) = timeout {
                backend = backend.with_timeout(timeout);
            }
            Ok(Arc::new(backend))
        }
        _ => Err(format!("Unknown search backend kind: {}", kind)),
    }
}
