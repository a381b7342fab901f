//! Bottom-up answer synthesis.
//!
//! Every node waits on a count of unsynthesized children. Leaves start
//! ready; when a node completes, its parent's count drops and the parent is
//! scheduled once it reaches zero. Ready nodes run concurrently up to the
//! configured limit, so independent subtrees proceed in parallel while every
//! child still completes before its parent.

use crate::cancel::CancellationToken;
use crate::evidence::{EvidenceId, EvidenceItem};
use crate::generate::{parse_json_reply, strip_code_fence, Generator};
use crate::report::{DegradationKind, DegradationReport};
use crate::tree::{AspectTree, NodeId, NodeStatus};
use crate::types::{AnswerStatus, Confidence, SynthesizedAnswer};
use frag_core::{AppError, AppResult, BackendError};
use frag_prompt::{build_prompt, BuiltPrompt, PromptDefinition};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};

/// Parsed synthesis reply before citation checks.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisReply {
    pub answer: String,
    pub citations: Vec<String>,
    pub confidence: Option<Confidence>,
}

/// Synthesizes answers for every node of a tree, children first.
pub struct Synthesizer<'a> {
    generator: &'a Generator,
    prompt: &'a PromptDefinition,
    concurrency: usize,
}

struct NodeInput {
    id: NodeId,
    prompt: BuiltPrompt,
    allowed: HashSet<EvidenceId>,
}

enum Outcome {
    Answered {
        text: String,
        citations: Vec<EvidenceId>,
        confidence: Option<Confidence>,
        dropped: Vec<String>,
    },
    Unresolved,
    Failed(String),
    Cancelled,
}

enum Step {
    Done(Outcome),
    Call(NodeInput),
}

struct Schedule {
    pending: Vec<usize>,
    ready: VecDeque<NodeId>,
    sequence: u64,
}

impl<'a> Synthesizer<'a> {
    pub fn new(generator: &'a Generator, prompt: &'a PromptDefinition, concurrency: usize) -> Self {
        Self {
            generator,
            prompt,
            concurrency: concurrency.max(1),
        }
    }

    /// Synthesize every node and return the root answer.
    ///
    /// Answers are stored on the nodes. Only prompt rendering errors and a
    /// missing root answer are returned as errors.
    pub async fn synthesize(
        &self,
        tree: &mut AspectTree,
        report: &mut DegradationReport,
        cancel: &CancellationToken,
    ) -> AppResult<SynthesizedAnswer> {
        let mut schedule = Schedule {
            pending: tree.nodes().map(|n| n.children.len()).collect(),
            ready: tree
                .post_order()
                .into_iter()
                .filter(|id| tree[*id].is_leaf())
                .collect(),
            sequence: 0,
        };
        let mut in_flight = FuturesUnordered::new();

        tracing::info!("Synthesizing answers for {} nodes", tree.len());

        loop {
            while in_flight.len() < self.concurrency {
                let Some(id) = schedule.ready.pop_front() else {
                    break;
                };
                match self.prepare(tree, report, id, cancel)? {
                    Step::Done(outcome) => schedule.finish(tree, report, id, outcome),
                    Step::Call(input) => in_flight.push(self.run(input, cancel)),
                }
            }

            match in_flight.next().await {
                Some((id, outcome)) => schedule.finish(tree, report, id, outcome),
                None if schedule.ready.is_empty() => break,
                None => {}
            }
        }

        tree.root().answer.clone().ok_or_else(|| {
            AppError::TreeInvariant("root was never synthesized".to_string())
        })
    }

    fn prepare(
        &self,
        tree: &AspectTree,
        report: &DegradationReport,
        id: NodeId,
        cancel: &CancellationToken,
    ) -> AppResult<Step> {
        let node = &tree[id];

        let children: Vec<(&str, &SynthesizedAnswer)> = node
            .children
            .iter()
            .filter_map(|c| {
                let child = &tree[*c];
                child
                    .answer
                    .as_ref()
                    .filter(|a| a.is_usable())
                    .map(|a| (child.question.as_str(), a))
            })
            .collect();

        if node.status == NodeStatus::Failed || (node.evidence.is_empty() && children.is_empty()) {
            return Ok(Step::Done(Outcome::Unresolved));
        }
        if cancel.is_cancelled() {
            return Ok(Step::Done(Outcome::Cancelled));
        }

        let mut evidence: Vec<&EvidenceItem> = node.evidence.items().iter().collect();
        let mut seen: HashSet<EvidenceId> = evidence.iter().map(|e| e.id).collect();
        for (_, answer) in &children {
            for cited in &answer.citations {
                if let Some(item) = tree.get(cited.node).and_then(|n| n.evidence.get(*cited)) {
                    if seen.insert(item.id) {
                        evidence.push(item);
                    }
                }
            }
        }

        let low_evidence = report.has(id, DegradationKind::EvidenceDegraded)
            || report.has(id, DegradationKind::EvidencePartial);

        let variables = json!({
            "question": node.question,
            "evidence": evidence
                .iter()
                .map(|e| json!({
                    "id": e.id.to_string(),
                    "title": e.title,
                    "source": e.source_id,
                    "snippet": e.snippet,
                }))
                .collect::<Vec<_>>(),
            "children": children
                .iter()
                .map(|(question, answer)| json!({"question": question, "answer": answer.text}))
                .collect::<Vec<_>>(),
            "low_evidence": low_evidence,
        });

        let allowed = tree
            .subtree(id)
            .into_iter()
            .flat_map(|n| tree[n].evidence.items().iter().map(|e| e.id))
            .collect();

        Ok(Step::Call(NodeInput {
            id,
            prompt: build_prompt(self.prompt, &variables)?,
            allowed,
        }))
    }

    async fn run(&self, input: NodeInput, cancel: &CancellationToken) -> (NodeId, Outcome) {
        let provider = self.generator.provider();
        let parse = |reply: &str| {
            parse_synthesis(reply).map_err(|detail| BackendError::malformed(provider, detail))
        };

        let first = match self.generator.generate(&input.prompt, cancel, parse).await {
            Ok(reply) => reply,
            Err(BackendError::Cancelled { .. }) => return (input.id, Outcome::Cancelled),
            Err(e) => return (input.id, Outcome::Failed(e.to_string())),
        };

        let (citations, unknown) = check_citations(&first.citations, &input.allowed);
        if unknown.is_empty() {
            return (input.id, answered(first.answer, citations, first.confidence, unknown));
        }

        tracing::warn!(
            "Node {} cited unknown evidence {:?}, asking again",
            input.id,
            unknown
        );

        let mut retry_prompt = input.prompt.clone();
        let mut valid: Vec<String> = input.allowed.iter().map(|e| e.to_string()).collect();
        valid.sort();
        retry_prompt.user.push_str(&format!(
            "\n\nYour previous answer cited ids that do not exist. Valid ids: {}",
            valid.join(", ")
        ));

        let outcome = match self.generator.generate(&retry_prompt, cancel, parse).await {
            Ok(second) => {
                let (citations, unknown) = check_citations(&second.citations, &input.allowed);
                answered(second.answer, citations, second.confidence, unknown)
            }
            Err(e) => {
                tracing::debug!("Citation retry for node {} failed: {}", input.id, e);
                answered(first.answer, citations, first.confidence, unknown)
            }
        };

        (input.id, outcome)
    }
}

fn answered(
    text: String,
    citations: Vec<EvidenceId>,
    confidence: Option<Confidence>,
    dropped: Vec<String>,
) -> Outcome {
    Outcome::Answered {
        text,
        citations,
        confidence,
        dropped,
    }
}

impl Schedule {
    fn finish(
        &mut self,
        tree: &mut AspectTree,
        report: &mut DegradationReport,
        id: NodeId,
        outcome: Outcome,
    ) {
        let sequence = self.sequence;
        self.sequence += 1;
        let question = tree[id].question.clone();

        let answer = match outcome {
            Outcome::Answered {
                text,
                citations,
                confidence,
                dropped,
            } => {
                if !dropped.is_empty() {
                    report.record(
                        id,
                        question,
                        DegradationKind::CitationsDropped,
                        Some(dropped.join(", ")),
                    );
                }
                SynthesizedAnswer {
                    node: id,
                    text,
                    citations,
                    confidence,
                    status: AnswerStatus::Complete,
                    sequence,
                }
            }
            Outcome::Unresolved => {
                report.record(id, question, DegradationKind::Unresolved, None);
                SynthesizedAnswer::unresolved(id, sequence)
            }
            Outcome::Failed(detail) => {
                report.record(id, question, DegradationKind::SynthesisFailed, Some(detail));
                SynthesizedAnswer::failed(id, sequence)
            }
            Outcome::Cancelled => {
                report.record(id, question, DegradationKind::Cancelled, None);
                SynthesizedAnswer::failed(id, sequence)
            }
        };

        let node = &mut tree[id];
        if answer.status == AnswerStatus::Failed {
            node.status = NodeStatus::Failed;
        } else if node.status != NodeStatus::Failed {
            node.status = NodeStatus::Synthesized;
        }
        node.answer = Some(answer);

        if let Some(parent) = node.parent {
            let remaining = &mut self.pending[parent.index()];
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.ready.push_back(parent);
            }
        }
    }
}

/// Split cited ids into those in `allowed` (deduplicated, in order) and the rest.
fn check_citations(
    cited: &[String],
    allowed: &HashSet<EvidenceId>,
) -> (Vec<EvidenceId>, Vec<String>) {
    let mut valid = Vec::new();
    let mut unknown = Vec::new();

    for raw in cited {
        match raw.parse::<EvidenceId>() {
            Ok(id) if allowed.contains(&id) => {
                if !valid.contains(&id) {
                    valid.push(id);
                }
            }
            _ => unknown.push(raw.clone()),
        }
    }

    (valid, unknown)
}

/// Parse a synthesis reply.
///
/// JSON replies need a non-empty `answer`; `citations` and `confidence` are
/// optional. A reply that is not JSON is taken as the answer text.
pub fn parse_synthesis(reply: &str) -> Result<SynthesisReply, String> {
    match parse_json_reply(reply) {
        Some(Value::Object(mut map)) => {
            let answer = match map.remove("answer") {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                _ => return Err("JSON reply has no \"answer\" text".to_string()),
            };

            let citations = match map.remove("citations") {
                Some(Value::Array(items)) => items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
                _ => Vec::new(),
            };

            let confidence = map
                .get("confidence")
                .and_then(Value::as_str)
                .and_then(Confidence::parse);

            Ok(SynthesisReply {
                answer,
                citations,
                confidence,
            })
        }
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(SynthesisReply {
            answer: s.trim().to_string(),
            citations: Vec::new(),
            confidence: None,
        }),
        Some(_) => Err("JSON reply is not an answer object".to_string()),
        None => {
            let text = strip_code_fence(reply);
            if text.is_empty() {
                return Err("reply is empty".to_string());
            }
            Ok(SynthesisReply {
                answer: text.to_string(),
                citations: Vec::new(),
                confidence: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_synthesis() {
        let reply = parse_synthesis(
            r#"{"answer": "The moon's gravity.", "citations": ["1.0", "2.1"], "confidence": "high"}"#,
        )
        .unwrap();
        assert_eq!(reply.answer, "The moon's gravity.");
        assert_eq!(reply.citations, vec!["1.0", "2.1"]);
        assert_eq!(reply.confidence, Some(Confidence::High));
    }

    #[test]
    fn test_parse_plain_text_synthesis() {
        let reply = parse_synthesis("Tides come from the moon.").unwrap();
        assert_eq!(reply.answer, "Tides come from the moon.");
        assert!(reply.citations.is_empty());
    }

    #[test]
    fn test_parse_malformed_synthesis() {
        assert!(parse_synthesis("").is_err());
        assert!(parse_synthesis(r#"{"answer": ""}"#).is_err());
        assert!(parse_synthesis(r#"{"text": "x"}"#).is_err());
        assert!(parse_synthesis("[1, 2]").is_err());
    }

    #[test]
    fn test_check_citations() {
        let allowed: HashSet<EvidenceId> = [EvidenceId::new(NodeId(1), 0)].into_iter().collect();
        let cited = vec![
            "1.0".to_string(),
            "[1.0]".to_string(),
            "9.9".to_string(),
            "junk".to_string(),
        ];
        let (valid, unknown) = check_citations(&cited, &allowed);
        assert_eq!(valid, vec![EvidenceId::new(NodeId(1), 0)]);
        assert_eq!(unknown, vec!["9.9", "junk"]);
    }
}
