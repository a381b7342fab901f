//! Degradation report for one pipeline run.

use crate::tree::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a node's contribution to the answer is weaker than it should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationKind {
    ExpansionFailed,
    /// Every search backend failed
    EvidenceDegraded,
    /// Some search backends failed
    EvidencePartial,
    SynthesisFailed,
    Unresolved,
    CitationsDropped,
    Cancelled,
}

impl DegradationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationKind::ExpansionFailed => "expansion_failed",
            DegradationKind::EvidenceDegraded => "evidence_degraded",
            DegradationKind::EvidencePartial => "evidence_partial",
            DegradationKind::SynthesisFailed => "synthesis_failed",
            DegradationKind::Unresolved => "unresolved",
            DegradationKind::CitationsDropped => "citations_dropped",
            DegradationKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DegradationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationEntry {
    pub node: NodeId,
    pub question: String,
    pub kind: DegradationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Why the builder threw away a proposed sub-aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    NodeCap,
    BranchingOverflow,
    NearDuplicate,
    Restatement,
    TooLong,
    /// Scored below the relevance threshold in a review
    Irrelevant,
    /// Dropped by a review recommending prune or modify
    Pruned,
}

/// A proposed sub-aspect that did not make it into the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionWarning {
    pub node: NodeId,
    pub aspect: String,
    pub reason: DiscardReason,
}

/// Everything that went wrong, node by node.
///
/// Expansion warnings are informational and do not mark the answer degraded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DegradationReport {
    pub entries: Vec<DegradationEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ExpansionWarning>,
}

impl DegradationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        node: NodeId,
        question: impl Into<String>,
        kind: DegradationKind,
        detail: Option<String>,
    ) {
        let question = question.into();
        tracing::warn!(node = %node, kind = %kind, "Degraded: {}", question);
        self.entries.push(DegradationEntry {
            node,
            question,
            kind,
            detail,
        });
    }

    pub fn warn(&mut self, node: NodeId, aspect: impl Into<String>, reason: DiscardReason) {
        let aspect = aspect.into();
        tracing::debug!(node = %node, reason = ?reason, "Discarded aspect: {}", aspect);
        self.warnings.push(ExpansionWarning {
            node,
            aspect,
            reason,
        });
    }

    pub fn extend(&mut self, other: DegradationReport) {
        self.entries.extend(other.entries);
        self.warnings.extend(other.warnings);
    }

    pub fn is_degraded(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.warnings.is_empty()
    }

    pub fn mentions(&self, node: NodeId) -> bool {
        self.entries.iter().any(|e| e.node == node)
    }

    pub fn has(&self, node: NodeId, kind: DegradationKind) -> bool {
        self.entries.iter().any(|e| e.node == node && e.kind == kind)
    }

    pub fn kinds_for(&self, node: NodeId) -> Vec<DegradationKind> {
        self.entries
            .iter()
            .filter(|e| e.node == node)
            .map(|e| e.kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_do_not_degrade() {
        let mut report = DegradationReport::new();
        report.warn(NodeId(1), "dup", DiscardReason::NearDuplicate);
        assert!(!report.is_degraded());
        assert!(!report.is_empty());

        report.record(NodeId(2), "q", DegradationKind::EvidencePartial, None);
        assert!(report.is_degraded());
        assert!(report.mentions(NodeId(2)));
        assert!(report.has(NodeId(2), DegradationKind::EvidencePartial));
        assert!(report.kinds_for(NodeId(1)).is_empty());
    }

    #[test]
    fn test_serializes_kinds_in_snake_case() {
        let mut report = DegradationReport::new();
        report.record(
            NodeId(0),
            "root",
            DegradationKind::CitationsDropped,
            Some("9.9".to_string()),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"][0]["kind"], "citations_dropped");
        assert!(json.get("warnings").is_none());
    }
}
