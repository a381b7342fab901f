//! Ask command handler.
//!
//! Runs the full pipeline for one question and prints the cited answer.

use super::{build_orchestrator, cancel_on_ctrl_c, print_json, TreeLimits};
use clap::Args;
use frag_core::{config::AppConfig, AppError, AppResult};
use frag_pipeline::{Evaluation, PipelineAnswer};
use std::path::PathBuf;

/// Answer a question with citations
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Grade the answer after synthesis
    #[arg(long)]
    pub evaluate: bool,

    /// Show the aspect tree below the answer
    #[arg(long)]
    pub show_tree: bool,

    /// Output as JSON (answer, citations, report and tree)
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub limits: TreeLimits,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.get_question()?;
        let orchestrator = build_orchestrator(config, &self.limits)?;
        let cancel = cancel_on_ctrl_c();

        let answer = orchestrator.answer(&question, &cancel).await?;

        let evaluation = if self.evaluate {
            match orchestrator.evaluate(&answer, &cancel).await {
                Ok(evaluation) => Some(evaluation),
                Err(e) => {
                    tracing::warn!("Evaluation failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        if self.json {
            print_json(&serde_json::json!({
                "answer": answer,
                "evaluation": evaluation,
            }))
        } else {
            self.print_text(&answer, evaluation.as_ref());
            Ok(())
        }
    }

    fn print_text(&self, answer: &PipelineAnswer, evaluation: Option<&Evaluation>) {
        println!("{}", answer.answer_text);

        if !answer.citations.is_empty() {
            println!();
            println!("Sources:");
            for citation in &answer.citations {
                match &citation.title {
                    Some(title) => println!("  [{}] {} - {}", citation.id, title, citation.source_id),
                    None => println!("  [{}] {}", citation.id, citation.source_id),
                }
            }
        }

        if let Some(confidence) = answer.confidence {
            println!();
            println!("Confidence: {}", confidence.as_str());
        }

        if answer.degraded {
            println!();
            println!("Degraded:");
            for entry in &answer.report.entries {
                let detail = entry
                    .detail
                    .as_deref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default();
                println!("  node {} {}: {}{}", entry.node, entry.kind, entry.question, detail);
            }
        }

        if self.show_tree {
            println!();
            print!("{}", answer.tree.render());
        }

        if let Some(evaluation) = evaluation {
            println!();
            println!("Evaluation: {:.2}/10", evaluation.overall);
            for score in &evaluation.scores {
                println!("  {:<22} {:>4.1}  {}", score.criterion, score.score, score.explanation);
            }
            if !evaluation.summary.is_empty() {
                println!("  {}", evaluation.summary);
            }
        }
    }

    fn get_question(&self) -> AppResult<String> {
        let question = match (&self.question, &self.file) {
            (Some(question), _) => question.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => {
                return Err(AppError::Config("No question provided".to_string()));
            }
        };

        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(AppError::Config("Question cannot be empty".to_string()));
        }
        Ok(question)
    }
}
