//! Test doubles and helpers.

use crate::config::PipelineConfig;
use crate::orchestrator::{Orchestrator, PromptSet};
use frag_core::{AppResult, BackendError};
use frag_llm::{LlmClient, LlmRequest, LlmResponse};
use frag_search::{SearchBackend, SearchHit};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

type Handler = dyn Fn(&LlmRequest) -> AppResult<String> + Send + Sync;

/// Generation backend that answers through a closure.
pub struct ScriptedLlm {
    handler: Box<Handler>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(handler: impl Fn(&LlmRequest) -> AppResult<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(|_| Ok(r#"{"aspects": []}"#.to_string())),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let content = (self.handler)(request)?;
        Ok(LlmResponse::new(content, request.model.clone()))
    }
}

type SearchHandler = dyn Fn(&str) -> AppResult<Vec<SearchHit>> + Send + Sync;

/// Search backend that answers through a closure.
pub struct ScriptedSearch {
    name: String,
    handler: Box<SearchHandler>,
    calls: AtomicUsize,
}

impl ScriptedSearch {
    pub fn new(
        name: &str,
        handler: impl Fn(&str) -> AppResult<Vec<SearchHit>> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
        })
    }

    /// Two distinct hits per query, keyed by the query text.
    pub fn echo(name: &str) -> Arc<Self> {
        let backend = name.to_string();
        Self::new(name, move |query| {
            let slug = slug(query);
            Ok(vec![
                SearchHit::new(
                    format!("https://{}.example.org/{}/1", backend, slug),
                    format!("First fact about {}", query),
                    1,
                )
                .with_title(format!("{} (1)", query)),
                SearchHit::new(
                    format!("https://{}.example.org/{}/2", backend, slug),
                    format!("Second fact about {}", query),
                    2,
                ),
            ])
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        let backend = name.to_string();
        Self::new(name, move |_| {
            Err(BackendError::unavailable(backend.clone(), "connection refused").into())
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SearchBackend for ScriptedSearch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut hits = (self.handler)(query)?;
        hits.truncate(k);
        Ok(hits)
    }
}

pub fn slug(text: &str) -> String {
    crate::similarity::normalize(text).replace(' ', "-")
}

/// Built-in prompts, loaded from an empty workspace.
pub fn prompts() -> PromptSet {
    let workspace = TempDir::new().unwrap();
    PromptSet::load(workspace.path()).unwrap()
}

/// Small limits and millisecond timeouts.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        max_depth: 2,
        max_branching: 2,
        max_nodes: 7,
        generation_timeout_ms: 500,
        search_timeout_ms: 500,
        generation_retries: 1,
        search_retries: 1,
        backoff_base_ms: 1,
        ..Default::default()
    }
}

pub fn orchestrator(
    llm: Arc<ScriptedLlm>,
    backends: Vec<Arc<ScriptedSearch>>,
    config: PipelineConfig,
) -> Orchestrator {
    let backends: Vec<Arc<dyn SearchBackend>> = backends
        .into_iter()
        .map(|b| b as Arc<dyn SearchBackend>)
        .collect();
    Orchestrator::new(llm, backends, prompts(), config, "test-model")
}

/// The aspect an expansion prompt asks about, if `request` is one.
pub fn expansion_aspect(request: &LlmRequest) -> Option<String> {
    let start = request.prompt.find("Aspect: \"")? + "Aspect: \"".len();
    let rest = &request.prompt[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Whether `request` asks for a review of proposed sub-aspects.
pub fn is_review(request: &LlmRequest) -> bool {
    request.prompt.contains("Proposed sub-aspects:")
}

/// The question a synthesis prompt asks about.
pub fn synthesis_question(request: &LlmRequest) -> String {
    request
        .prompt
        .lines()
        .find_map(|l| l.strip_prefix("Question: "))
        .unwrap_or_default()
        .to_string()
}

/// Evidence ids listed in a synthesis prompt.
pub fn listed_evidence(request: &LlmRequest) -> Vec<String> {
    request
        .prompt
        .lines()
        .filter_map(|l| l.strip_prefix('['))
        .filter_map(|l| l.split_once(']'))
        .map(|(id, _)| id.to_string())
        .collect()
}

/// Synthesis reply citing every listed evidence id.
pub fn cite_everything(request: &LlmRequest) -> String {
    serde_json::json!({
        "answer": format!("Answer to {}", synthesis_question(request)),
        "citations": listed_evidence(request),
        "confidence": "high",
    })
    .to_string()
}

/// Two sub-aspects for the root, none below.
pub fn tides_llm() -> Arc<ScriptedLlm> {
    ScriptedLlm::new(|request| match expansion_aspect(request) {
        Some(aspect) if aspect == "What causes tides?" => {
            Ok(r#"{"aspects": ["Role of the moon", "Role of the sun"]}"#.to_string())
        }
        Some(_) => Ok(r#"{"aspects": []}"#.to_string()),
        None => Ok(cite_everything(request)),
    })
}
