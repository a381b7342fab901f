//! Pipeline configuration.

use frag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How hits from several search backends are ordered before truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
    /// Backends in configured order, each backend's hits in rank order.
    BackendPriority,
    /// Per-backend rank normalized to `1 - (rank - 1) / n`.
    #[default]
    ScoreNormalized,
    /// Normalized score blended with a source-authority weight.
    Authority,
}

/// What text is sent to the search backends for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// The node's own question.
    #[default]
    Question,
    /// The root-to-node question chain joined by spaces.
    Path,
}

/// Tuning knobs for one pipeline run.
///
/// Loaded from `.frag/pipeline.yaml` when present. Every field has a default,
/// so a partial file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Levels allowed below the root
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(default = "default_max_branching")]
    pub max_branching: u32,

    /// Total node cap, root included
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,

    #[serde(default = "default_evidence_cap")]
    pub per_node_evidence_cap: u32,

    /// Hits requested from each backend
    #[serde(default = "default_search_k")]
    pub search_k: u32,

    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,

    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    /// Retries after the first generation attempt
    #[serde(default = "default_retries")]
    pub generation_retries: u32,

    /// Retries after the first search attempt
    #[serde(default = "default_retries")]
    pub search_retries: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Token Jaccard similarity at which two aspects count as duplicates
    #[serde(default = "default_similarity_threshold")]
    pub aspect_similarity_threshold: f64,

    /// Share of the authority weight in the `authority` ranking score
    #[serde(default = "default_authority_weight")]
    pub authority_weight: f64,

    #[serde(default)]
    pub ranking: RankingPolicy,

    #[serde(default)]
    pub query_mode: QueryMode,

    /// Cap how many merged hits any one kind of site contributes
    #[serde(default)]
    pub balance_categories: bool,

    /// Ask the model to review each node's proposed sub-aspects
    #[serde(default)]
    pub reflect_aspects: bool,

    /// Reviewed sub-aspects scoring below this (0 to 10) are pruned
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,

    #[serde(default = "default_concurrency")]
    pub retrieval_concurrency: usize,

    #[serde(default = "default_concurrency")]
    pub synthesis_concurrency: usize,

    /// Model used for every generation call; falls back to the app model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn default_max_depth() -> u32 {
    2
}

fn default_max_branching() -> u32 {
    3
}

fn default_max_nodes() -> u32 {
    13
}

fn default_evidence_cap() -> u32 {
    5
}

fn default_search_k() -> u32 {
    5
}

fn default_generation_timeout_ms() -> u64 {
    60_000
}

fn default_search_timeout_ms() -> u64 {
    15_000
}

fn default_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_similarity_threshold() -> f64 {
    0.8
}

fn default_authority_weight() -> f64 {
    0.3
}

fn default_relevance_threshold() -> f64 {
    7.0
}

fn default_concurrency() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_branching: default_max_branching(),
            max_nodes: default_max_nodes(),
            per_node_evidence_cap: default_evidence_cap(),
            search_k: default_search_k(),
            generation_timeout_ms: default_generation_timeout_ms(),
            search_timeout_ms: default_search_timeout_ms(),
            generation_retries: default_retries(),
            search_retries: default_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            aspect_similarity_threshold: default_similarity_threshold(),
            authority_weight: default_authority_weight(),
            ranking: RankingPolicy::default(),
            query_mode: QueryMode::default(),
            balance_categories: false,
            reflect_aspects: false,
            relevance_threshold: default_relevance_threshold(),
            retrieval_concurrency: default_concurrency(),
            synthesis_concurrency: default_concurrency(),
            model: None,
        }
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        let positive = [
            ("max_depth", self.max_depth as u64),
            ("max_branching", self.max_branching as u64),
            ("max_nodes", self.max_nodes as u64),
            ("per_node_evidence_cap", self.per_node_evidence_cap as u64),
            ("search_k", self.search_k as u64),
            ("generation_timeout_ms", self.generation_timeout_ms),
            ("search_timeout_ms", self.search_timeout_ms),
            ("retrieval_concurrency", self.retrieval_concurrency as u64),
            ("synthesis_concurrency", self.synthesis_concurrency as u64),
        ];

        for (name, value) in positive {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be at least 1", name)));
            }
        }

        // Zero would make every pair of aspects a duplicate.
        let threshold = self.aspect_similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(AppError::Config(format!(
                "aspect_similarity_threshold must be within (0, 1], got {}",
                threshold
            )));
        }

        if !(0.0..=1.0).contains(&self.authority_weight) {
            return Err(AppError::Config(format!(
                "authority_weight must be within [0, 1], got {}",
                self.authority_weight
            )));
        }

        if !(0.0..=10.0).contains(&self.relevance_threshold) {
            return Err(AppError::Config(format!(
                "relevance_threshold must be within [0, 10], got {}",
                self.relevance_threshold
            )));
        }

        if matches!(self.model.as_deref(), Some(m) if m.trim().is_empty()) {
            return Err(AppError::Config("model cannot be empty".to_string()));
        }

        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// Path of the pipeline configuration file in a workspace.
pub fn get_config_path(workspace: &Path) -> PathBuf {
    workspace
        .join(frag_core::config::FRAG_DIR)
        .join("pipeline.yaml")
}

/// Load pipeline configuration.
///
/// Reads `.frag/pipeline.yaml` if it exists, otherwise returns defaults.
/// The result is not validated; the orchestrator does that before running.
pub fn load_config(workspace: &Path) -> AppResult<PipelineConfig> {
    let config_path = get_config_path(workspace);

    if !config_path.exists() {
        tracing::debug!("Using default pipeline config (no config file found)");
        return Ok(PipelineConfig::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;

    let config: PipelineConfig = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Loaded pipeline config from {:?}", config_path);
    Ok(config)
}
