//! Pipeline entry point.

use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::evaluate::{evaluate, Evaluation};
use crate::expand::{Expansion, TreeBuilder};
use crate::generate::Generator;
use crate::report::DegradationKind;
use crate::retrieve::{query_for, RetrievalStatus, Retriever};
use crate::retry::RetryPolicy;
use crate::synthesize::Synthesizer;
use crate::tree::{NodeId, NodeStatus};
use crate::types::{AnswerStatus, Citation, PipelineAnswer};
use frag_core::{AppError, AppResult};
use frag_llm::LlmClient;
use frag_prompt::{
    load_prompt, PromptDefinition, ANSWER_EVALUATE, ANSWER_SYNTHESIZE, ASPECTS_EXPAND,
    ASPECTS_REFLECT,
};
use frag_search::SearchBackend;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// The prompts one pipeline run uses.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub expand: PromptDefinition,
    pub reflect: PromptDefinition,
    pub synthesize: PromptDefinition,
    pub evaluate: PromptDefinition,
}

impl PromptSet {
    /// Load prompts, preferring overrides under `.frag/prompts/` in `workspace`.
    pub fn load(workspace: &Path) -> AppResult<Self> {
        Ok(Self {
            expand: load_prompt(workspace, ASPECTS_EXPAND)?,
            reflect: load_prompt(workspace, ASPECTS_REFLECT)?,
            synthesize: load_prompt(workspace, ANSWER_SYNTHESIZE)?,
            evaluate: load_prompt(workspace, ANSWER_EVALUATE)?,
        })
    }
}

/// Coordinates expansion, retrieval and synthesis for one question at a time.
pub struct Orchestrator {
    generator: Generator,
    retriever: Retriever,
    prompts: PromptSet,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        backends: Vec<Arc<dyn SearchBackend>>,
        prompts: PromptSet,
        config: PipelineConfig,
        model: impl Into<String>,
    ) -> Self {
        let policy = RetryPolicy::new(
            config.generation_retries,
            config.generation_timeout(),
            config.backoff_base(),
        );
        let model = config.model.clone().unwrap_or_else(|| model.into());

        Self {
            generator: Generator::new(llm, model, policy),
            retriever: Retriever::new(backends, &config),
            prompts,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn check(&self, question: &str) -> AppResult<()> {
        self.config.validate()?;
        if question.trim().is_empty() {
            return Err(AppError::Config("question cannot be empty".to_string()));
        }
        Ok(())
    }

    fn tree_builder(&self) -> TreeBuilder<'_> {
        let builder = TreeBuilder::new(&self.generator, &self.prompts.expand, &self.config);
        if self.config.reflect_aspects {
            builder.with_reflection(&self.prompts.reflect)
        } else {
            builder
        }
    }

    /// Expand `question` into an aspect tree without retrieving or answering.
    pub async fn build_tree(&self, question: &str, cancel: &CancellationToken) -> AppResult<Expansion> {
        self.check(question)?;
        let expansion = self.tree_builder().expand(question, cancel).await?;
        expansion.tree.validate()?;
        Ok(expansion)
    }

    /// Answer `question` with citations and a degradation report.
    ///
    /// Fails only on invalid configuration, prompt errors and broken tree
    /// invariants; backend failures degrade the answer instead.
    pub async fn answer(&self, question: &str, cancel: &CancellationToken) -> AppResult<PipelineAnswer> {
        self.check(question)?;
        if self.retriever.backend_count() == 0 {
            return Err(AppError::Config(
                "at least one search backend is required".to_string(),
            ));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("pipeline", run_id = %run_id);

        self.run(run_id, question.trim(), cancel)
            .instrument(span)
            .await
    }

    async fn run(&self, run_id: String, question: &str, cancel: &CancellationToken) -> AppResult<PipelineAnswer> {
        let start = Instant::now();
        tracing::info!("Answering question: {}", question);

        let Expansion {
            mut tree,
            mut report,
            ..
        } = self.tree_builder().expand(question, cancel).await?;

        // Retrieval
        let targets: Vec<(NodeId, String)> = tree
            .nodes()
            .filter(|n| n.status != NodeStatus::Failed)
            .map(|n| (n.id, query_for(&tree, n.id, self.config.query_mode)))
            .collect();

        if cancel.is_cancelled() {
            tracing::info!("Skipping retrieval for {} nodes after cancellation", targets.len());
        } else {
            tracing::info!("Retrieving evidence for {} nodes", targets.len());

            let retriever = &self.retriever;
            let results: Vec<_> = stream::iter(targets)
                .map(|(id, query)| async move {
                    retriever.retrieve_for_node(id, &query, cancel).await
                })
                .buffer_unordered(self.config.retrieval_concurrency)
                .collect()
                .await;

            for result in results {
                let node = result.node;
                let kind = match result.status {
                    RetrievalStatus::Complete => None,
                    RetrievalStatus::Partial => Some(DegradationKind::EvidencePartial),
                    RetrievalStatus::Degraded => Some(DegradationKind::EvidenceDegraded),
                    RetrievalStatus::Cancelled => Some(DegradationKind::Cancelled),
                };
                if let Some(kind) = kind {
                    let detail = result
                        .failures
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; ");
                    report.record(node, tree[node].question.clone(), kind, Some(detail));
                }
                tree[node].evidence = result.store;
                tree[node].status = NodeStatus::Retrieved;
            }
        }

        // Synthesis
        let root_answer = Synthesizer::new(
            &self.generator,
            &self.prompts.synthesize,
            self.config.synthesis_concurrency,
        )
        .synthesize(&mut tree, &mut report, cancel)
        .await?;

        tree.validate()?;

        if cancel.is_cancelled() && !report.has(NodeId::ROOT, DegradationKind::Cancelled) {
            report.record(
                NodeId::ROOT,
                question,
                DegradationKind::Cancelled,
                Some("run cancelled".to_string()),
            );
        }

        let citations = root_answer
            .citations
            .iter()
            .filter_map(|id| {
                let item = tree.get(id.node)?.evidence.get(*id)?;
                Some(Citation {
                    id: *id,
                    source_id: item.source_id.clone(),
                    title: item.title.clone(),
                    snippet: item.snippet.clone(),
                })
            })
            .collect();

        let degraded = report.is_degraded() || root_answer.status != AnswerStatus::Complete;

        tracing::info!(
            "Pipeline finished in {:.2}s ({} nodes, degraded: {})",
            start.elapsed().as_secs_f64(),
            tree.len(),
            degraded
        );

        Ok(PipelineAnswer {
            run_id,
            question: question.to_string(),
            answer_text: root_answer.text,
            citations,
            confidence: root_answer.confidence,
            degraded,
            report,
            tree,
        })
    }

    /// Grade a finished answer.
    pub async fn evaluate(&self, answer: &PipelineAnswer, cancel: &CancellationToken) -> AppResult<Evaluation> {
        evaluate(
            &self.generator,
            &self.prompts.evaluate,
            &answer.question,
            &answer.answer_text,
            cancel,
        )
        .await
    }
}
