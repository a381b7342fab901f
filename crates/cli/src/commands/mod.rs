//! Command handlers for the FRAG CLI.
//!
//! `ask` and `tree` share the pipeline setup below: the generation client and
//! search backends come from `AppConfig`, tuning from `.frag/pipeline.yaml`.

pub mod ask;
pub mod prompts;
pub mod tree;

pub use ask::AskCommand;
pub use prompts::PromptsCommand;
pub use tree::TreeCommand;

use clap::Args;
use frag_core::{config::AppConfig, AppError, AppResult};
use frag_llm::create_client;
use frag_pipeline::{CancellationToken, Orchestrator, PipelineConfig, PromptSet};
use frag_search::{create_backend, SearchBackend};
use std::sync::Arc;
use std::time::Duration;

/// Tree limit overrides shared by `ask` and `tree`.
#[derive(Args, Debug, Default)]
pub struct TreeLimits {
    /// Maximum depth below the root question
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Maximum sub-aspects per node
    #[arg(long)]
    pub max_branching: Option<u32>,

    /// Maximum nodes in the tree, root included
    #[arg(long)]
    pub max_nodes: Option<u32>,

    /// Have the model review and prune each node's proposed sub-aspects
    #[arg(long)]
    pub reflect: bool,
}

impl TreeLimits {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(branching) = self.max_branching {
            config.max_branching = branching;
        }
        if let Some(nodes) = self.max_nodes {
            config.max_nodes = nodes;
        }
        if self.reflect {
            config.reflect_aspects = true;
        }
    }
}

/// Build an orchestrator from the application config and CLI limits.
///
/// Everything is validated here, before the first external call.
pub fn build_orchestrator(config: &AppConfig, limits: &TreeLimits) -> AppResult<Orchestrator> {
    config.validate()?;

    let mut pipeline = frag_pipeline::load_config(&config.workspace)?;
    limits.apply(&mut pipeline);
    pipeline.validate()?;

    let api_key = config.resolve_api_key(&config.provider);
    let llm = create_client(
        &config.provider,
        config.resolve_endpoint(),
        api_key.as_deref(),
        config.resolve_timeout().map(Duration::from_secs),
    )
    .map_err(AppError::Config)?;

    let backends = config
        .search
        .backends
        .iter()
        .map(|backend| {
            let api_key = config.resolve_search_key(backend);
            create_backend(
                &backend.kind,
                &backend.name,
                backend.engine.as_deref(),
                backend.endpoint.as_deref(),
                api_key.as_deref(),
                None,
            )
            .map_err(AppError::Config)
        })
        .collect::<AppResult<Vec<Arc<dyn SearchBackend>>>>()?;

    tracing::debug!(
        "Pipeline: provider {}, {} search backends, {:?}",
        llm.provider_name(),
        backends.len(),
        pipeline
    );

    let prompts = PromptSet::load(&config.workspace)?;
    Ok(Orchestrator::new(llm, backends, prompts, pipeline, config.model.clone()))
}

/// A token raised on Ctrl-C.
///
/// The pipeline stops issuing calls and still reports what it has.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing with the evidence gathered so far");
            handle.cancel();
        }
    });

    token
}

/// Serialize `value` as pretty JSON to stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
