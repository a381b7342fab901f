//! Answer types produced by the pipeline.

use crate::evidence::EvidenceId;
use crate::report::DegradationReport;
use crate::tree::{AspectTree, NodeId};
use serde::{Deserialize, Serialize};

/// Answer text used for an aspect that could not be answered.
pub const UNRESOLVED_MARKER: &str = "aspect unresolved";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Complete,
    Unresolved,
    Failed,
}

/// The synthesized answer for one node. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    pub node: NodeId,
    pub text: String,
    pub citations: Vec<EvidenceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    pub status: AnswerStatus,
    /// Completion order within one synthesis run
    pub sequence: u64,
}

impl SynthesizedAnswer {
    pub fn unresolved(node: NodeId, sequence: u64) -> Self {
        Self {
            node,
            text: UNRESOLVED_MARKER.to_string(),
            citations: Vec::new(),
            confidence: None,
            status: AnswerStatus::Unresolved,
            sequence,
        }
    }

    pub fn failed(node: NodeId, sequence: u64) -> Self {
        Self {
            node,
            text: String::new(),
            citations: Vec::new(),
            confidence: None,
            status: AnswerStatus::Failed,
            sequence,
        }
    }

    /// Whether a parent can build on this answer.
    pub fn is_usable(&self) -> bool {
        self.status == AnswerStatus::Complete && !self.text.trim().is_empty()
    }
}

/// A cited evidence item, resolved for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: EvidenceId,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub snippet: String,
}

/// Final result of [`Orchestrator::answer`](crate::Orchestrator::answer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineAnswer {
    pub run_id: String,
    pub question: String,
    pub answer_text: String,
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    pub degraded: bool,
    pub report: DegradationReport,
    pub tree: AspectTree,
}
