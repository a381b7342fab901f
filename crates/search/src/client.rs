//! Search backend abstraction and result types.

use frag_core::AppResult;
use serde::{Deserialize, Serialize};

/// One raw search result as returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Source identifier (URL or document id)
    pub source_id: String,

    /// Result title, when the backend provides one
    #[serde(default)]
    pub title: String,

    /// Text snippet
    pub snippet: String,

    /// 1-based position in the backend's ranking
    pub rank: u32,
}

impl SearchHit {
    pub fn new(source_id: impl Into<String>, snippet: impl Into<String>, rank: u32) -> Self {
        Self {
            source_id: source_id.into(),
            title: String::new(),
            snippet: snippet.into(),
            rank,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Trait for search providers.
///
/// An empty result is `Ok(vec![])`, not an error. Timeouts, quota and
/// malformed payloads are reported as `AppError::Backend`.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name, unique within one pipeline configuration.
    fn name(&self) -> &str;

    /// Return at most `k` ranked hits for `query`.
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<SearchHit>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_builder() {
        let hit = SearchHit::new("https://example.org/tides", "The moon pulls", 1)
            .with_title("Tides");
        assert_eq!(hit.title, "Tides");
        assert_eq!(hit.rank, 1);
    }

    #[test]
    fn test_hit_title_defaults_empty() {
        let hit: SearchHit =
            serde_json::from_str(r#"{"source_id":"a","snippet":"b","rank":2}"#).unwrap();
        assert!(hit.title.is_empty());
    }
}
