//! Aspect-tree question answering.
//!
//! A question is expanded breadth-first into a bounded tree of aspects, each
//! aspect is searched across every configured backend, and answers are
//! synthesized bottom-up into a cited root answer. Backend failures never
//! abort a run; they are collected in a [`DegradationReport`] next to the
//! best answer the pipeline could produce.
//!
//! # Example
//! ```no_run
//! use frag_pipeline::{CancellationToken, Orchestrator, PipelineConfig, PromptSet};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let llm = frag_llm::create_client("ollama", None, None, None)?;
//! let search = frag_search::create_backend("serpapi", "google", Some("google"), None, Some("key"), None)?;
//! let orchestrator = Orchestrator::new(
//!     llm,
//!     vec![search],
//!     PromptSet::load(Path::new("."))?,
//!     PipelineConfig::default(),
//!     "llama3.2",
//! );
//! let answer = orchestrator.answer("What causes tides?", &CancellationToken::new()).await?;
//! println!("{}", answer.answer_text);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod evaluate;
pub mod evidence;
pub mod expand;
pub mod generate;
pub mod orchestrator;
pub mod ranking;
pub mod reflect;
pub mod report;
pub mod retrieve;
pub mod retry;
pub mod similarity;
pub mod synthesize;
pub mod tree;
pub mod types;

#[cfg(test)]
mod tests;

pub use cancel::CancellationToken;
pub use config::{load_config, PipelineConfig, QueryMode, RankingPolicy};
pub use evaluate::Evaluation;
pub use evidence::{EvidenceId, EvidenceItem, EvidenceStore};
pub use orchestrator::{Orchestrator, PromptSet};
pub use report::{DegradationKind, DegradationReport, DiscardReason, ExpansionWarning};
pub use tree::{AspectNode, AspectTree, NodeId, NodeStatus};
pub use types::{
    AnswerStatus, Citation, Confidence, PipelineAnswer, SynthesizedAnswer, UNRESOLVED_MARKER,
};
