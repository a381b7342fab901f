//! Breadth-first aspect tree construction.

use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::generate::{parse_json_reply, Generator};
use crate::reflect::{apply_reflection, parse_reflection};
use crate::report::{DegradationKind, DegradationReport, DiscardReason};
use crate::similarity::{is_near_duplicate, normalize};
use crate::tree::{AspectTree, NodeId, NodeStatus};
use frag_core::{AppResult, BackendError};
use frag_prompt::{build_prompt, PromptDefinition};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::OnceLock;

/// Longest accepted sub-aspect, in characters.
pub const MAX_ASPECT_CHARS: usize = 300;

/// Result of expanding a question.
#[derive(Debug)]
pub struct Expansion {
    pub tree: AspectTree,
    pub report: DegradationReport,
    /// Expansion stopped early because the run was cancelled
    pub cancelled: bool,
}

/// Sub-aspects proposed for one node, after per-entry validation.
#[derive(Debug, Default, PartialEq)]
pub struct Proposal {
    pub accepted: Vec<String>,
    pub discarded: Vec<(String, DiscardReason)>,
}

/// Grows an [`AspectTree`] one node at a time with a generation call per node.
pub struct TreeBuilder<'a> {
    generator: &'a Generator,
    prompt: &'a PromptDefinition,
    reflect: Option<&'a PromptDefinition>,
    config: &'a PipelineConfig,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(
        generator: &'a Generator,
        prompt: &'a PromptDefinition,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            generator,
            prompt,
            reflect: None,
            config,
        }
    }

    /// Review every non-empty proposal with `prompt` before adding children.
    pub fn with_reflection(mut self, prompt: &'a PromptDefinition) -> Self {
        self.reflect = Some(prompt);
        self
    }

    /// Expand `question` into a bounded tree.
    ///
    /// Only prompt rendering errors are returned; generation failures mark
    /// the node failed and expansion carries on with the next pending node.
    pub async fn expand(&self, question: &str, cancel: &CancellationToken) -> AppResult<Expansion> {
        let config = self.config;
        let mut tree = AspectTree::new(
            question.trim(),
            config.max_depth,
            config.max_branching,
            config.max_nodes,
        );
        let mut report = DegradationReport::new();
        let mut cancelled = false;
        let mut queue = VecDeque::from([NodeId::ROOT]);

        tracing::info!(
            "Expanding question (max_depth: {}, max_branching: {}, max_nodes: {})",
            config.max_depth,
            config.max_branching,
            config.max_nodes
        );

        while let Some(id) = queue.pop_front() {
            if cancelled || cancel.is_cancelled() {
                cancelled = true;
                tree[id].status = NodeStatus::Expanded;
                continue;
            }

            if tree[id].depth >= config.max_depth || !tree.has_capacity() {
                tree[id].status = NodeStatus::Expanded;
                continue;
            }

            let ancestors: Vec<String> = tree
                .ancestors(id)
                .into_iter()
                .map(|a| tree[a].question.clone())
                .collect();
            let own = tree[id].question.clone();

            let built = build_prompt(
                self.prompt,
                &json!({
                    "question": own,
                    "ancestors": ancestors,
                    "max_branching": config.max_branching,
                }),
            )?;

            let threshold = config.aspect_similarity_threshold;
            let result = self
                .generator
                .generate(&built, cancel, |reply| {
                    let raw = parse_aspects(reply)
                        .map_err(|detail| BackendError::malformed(self.generator.provider(), detail))?;
                    let proposal = select_aspects(raw, &own, &ancestors, threshold);
                    if proposal.accepted.is_empty() && !proposal.discarded.is_empty() {
                        return Err(BackendError::malformed(
                            self.generator.provider(),
                            "every proposed aspect was invalid",
                        ));
                    }
                    Ok(proposal)
                })
                .await;

            match result {
                Ok(proposal) => {
                    for (aspect, reason) in proposal.discarded {
                        report.warn(id, aspect, reason);
                    }

                    let mut accepted = proposal.accepted;
                    if let Some(prompt) = self.reflect.filter(|_| !accepted.is_empty()) {
                        let reviewed = self.review(prompt, &own, &ancestors, &accepted, cancel).await?;
                        match reviewed {
                            Ok(reviewed) => {
                                for (aspect, reason) in reviewed.discarded {
                                    report.warn(id, aspect, reason);
                                }
                                accepted = reviewed.accepted;
                            }
                            Err(BackendError::Cancelled { .. }) => cancelled = true,
                            Err(e) => {
                                tracing::warn!("Review of node {} failed, keeping its sub-aspects: {}", id, e);
                            }
                        }
                    }

                    // Nodes at max_depth were skipped above, so no child can exceed it.
                    for (index, aspect) in accepted.into_iter().enumerate() {
                        if index >= config.max_branching as usize {
                            report.warn(id, aspect, DiscardReason::BranchingOverflow);
                        } else if !tree.has_capacity() {
                            report.warn(id, aspect, DiscardReason::NodeCap);
                        } else {
                            let child = tree.add_child(id, aspect)?;
                            queue.push_back(child);
                        }
                    }
                    tree[id].status = NodeStatus::Expanded;
                    tracing::debug!(
                        "Expanded node {} into {} children",
                        id,
                        tree[id].children.len()
                    );
                }
                Err(BackendError::Cancelled { .. }) => {
                    cancelled = true;
                    tree[id].status = NodeStatus::Expanded;
                }
                Err(e) => {
                    tree[id].status = NodeStatus::Failed;
                    report.record(
                        id,
                        tree[id].question.clone(),
                        DegradationKind::ExpansionFailed,
                        Some(e.to_string()),
                    );
                }
            }
        }

        if cancelled {
            report.record(
                NodeId::ROOT,
                tree.root().question.clone(),
                DegradationKind::Cancelled,
                Some("expansion stopped early".to_string()),
            );
        }

        tracing::info!(
            "Aspect tree has {} nodes ({} discarded aspects)",
            tree.len(),
            report.warnings.len()
        );

        Ok(Expansion {
            tree,
            report,
            cancelled,
        })
    }

    /// Ask the model to review the sub-aspects accepted for a node.
    ///
    /// The outer error is a prompt rendering failure; the inner one is the
    /// model failing after retries.
    async fn review(
        &self,
        prompt: &PromptDefinition,
        own: &str,
        ancestors: &[String],
        candidates: &[String],
        cancel: &CancellationToken,
    ) -> AppResult<Result<Proposal, BackendError>> {
        let config = self.config;
        let built = build_prompt(
            prompt,
            &json!({
                "question": own,
                "ancestors": ancestors,
                "aspects": candidates,
                "max_branching": config.max_branching,
            }),
        )?;

        let provider = self.generator.provider();
        let result = self
            .generator
            .generate(&built, cancel, |reply| {
                parse_reflection(reply).map_err(|detail| BackendError::malformed(provider, detail))
            })
            .await;

        Ok(result.map(|reflection| {
            tracing::debug!(
                fairness = ?reflection.fairness,
                diversity = ?reflection.diversity,
                "Reviewed {} sub-aspects: {:?}",
                candidates.len(),
                reflection.recommendation
            );
            apply_reflection(
                candidates.to_vec(),
                reflection,
                config.relevance_threshold,
                own,
                ancestors,
                config.aspect_similarity_threshold,
            )
        }))
    }
}

fn bullet_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*(?:[-*+\u{2022}]|\d+[.)]|\(\d+\))\s+").ok())
        .as_ref()
}

/// Extract the raw list of sub-aspects from a model reply.
///
/// Accepts `{"aspects": [...]}`, a bare JSON array, or a one-per-line list.
/// An empty list is valid and means the node is a leaf.
pub fn parse_aspects(reply: &str) -> Result<Vec<String>, String> {
    if let Some(value) = parse_json_reply(reply) {
        let list = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("aspects") {
                Some(Value::Array(items)) => items,
                _ => return Err("JSON reply has no \"aspects\" list".to_string()),
            },
            _ => return Err("JSON reply is neither an object nor a list".to_string()),
        };

        return list
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                Value::Object(mut obj) => match obj.remove("question") {
                    Some(Value::String(s)) => Ok(s),
                    _ => Err("aspect entry is not a string".to_string()),
                },
                _ => Err("aspect entry is not a string".to_string()),
            })
            .collect();
    }

    let lines: Vec<&str> = reply
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("```"))
        .collect();

    if lines.is_empty() {
        return Err("reply is empty".to_string());
    }

    let Some(pattern) = bullet_pattern() else {
        return Ok(lines.into_iter().map(str::to_string).collect());
    };

    // With any bullets present, prose around the list is ignored.
    let bulleted: Vec<String> = lines
        .iter()
        .filter(|l| pattern.is_match(l))
        .map(|l| pattern.replace(l, "").trim().to_string())
        .collect();

    if bulleted.is_empty() {
        Ok(lines.into_iter().map(str::to_string).collect())
    } else {
        Ok(bulleted)
    }
}

/// Validate proposed aspects against a node and its ancestors.
///
/// Entries are trimmed; empty entries are dropped silently. Overlong
/// entries, restatements of the node or an ancestor, and near-duplicates of
/// an earlier sibling are discarded with a reason.
pub fn select_aspects(
    raw: Vec<String>,
    own_question: &str,
    ancestors: &[String],
    threshold: f64,
) -> Proposal {
    let mut proposal = Proposal::default();

    for entry in raw {
        let aspect = entry
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_string();

        if aspect.is_empty() || normalize(&aspect).is_empty() {
            continue;
        }

        if aspect.chars().count() > MAX_ASPECT_CHARS {
            proposal.discarded.push((aspect, DiscardReason::TooLong));
            continue;
        }

        let restates = std::iter::once(own_question)
            .chain(ancestors.iter().map(String::as_str))
            .any(|q| is_near_duplicate(&aspect, q, threshold));
        if restates {
            proposal.discarded.push((aspect, DiscardReason::Restatement));
            continue;
        }

        if proposal
            .accepted
            .iter()
            .any(|sibling| is_near_duplicate(&aspect, sibling, threshold))
        {
            proposal.discarded.push((aspect, DiscardReason::NearDuplicate));
            continue;
        }

        proposal.accepted.push(aspect);
    }

    proposal
}
