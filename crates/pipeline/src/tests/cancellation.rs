use super::support::*;
use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::report::DegradationKind;
use crate::tree::{NodeId, NodeStatus};
use crate::types::UNRESOLVED_MARKER;
use frag_core::AppError;
use std::sync::Arc;

#[tokio::test]
async fn test_cancel_before_start_makes_no_calls() {
    let llm = tides_llm();
    let search = ScriptedSearch::echo("google");
    let orchestrator = orchestrator(llm.clone(), vec![search.clone()], fast_config());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let answer = orchestrator.answer("What causes tides?", &cancel).await.unwrap();

    assert_eq!(llm.calls(), 0);
    assert_eq!(search.calls(), 0);
    assert_eq!(answer.answer_text, UNRESOLVED_MARKER);
    assert_eq!(answer.tree.len(), 1);
    assert!(answer.degraded);
    assert!(answer.report.has(NodeId::ROOT, DegradationKind::Cancelled));
}

#[tokio::test]
async fn test_cancel_during_expansion_stops_further_calls() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    // Cancels while the root is being expanded; the reply itself still lands.
    let llm = ScriptedLlm::new(move |_| {
        trigger.cancel();
        Ok(r#"{"aspects": ["Role of the moon", "Role of the sun"]}"#.to_string())
    });
    let search = ScriptedSearch::echo("google");
    let orchestrator = orchestrator(llm.clone(), vec![search.clone()], fast_config());

    let answer = orchestrator.answer("What causes tides?", &cancel).await.unwrap();

    assert_eq!(llm.calls(), 1);
    assert_eq!(search.calls(), 0);
    assert_eq!(answer.tree.len(), 3);
    assert_eq!(answer.answer_text, UNRESOLVED_MARKER);
    assert!(answer.report.has(NodeId::ROOT, DegradationKind::Cancelled));

    // Every node still ends with an answer, so the tree stays consistent.
    for node in answer.tree.nodes() {
        assert!(node.answer.is_some(), "node {} has no answer", node.id);
        assert_ne!(node.status, NodeStatus::Pending);
    }
}

#[tokio::test]
async fn test_cancelled_build_tree_keeps_root() {
    let llm = tides_llm();
    let orchestrator = orchestrator(llm.clone(), vec![ScriptedSearch::echo("google")], fast_config());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let expansion = orchestrator.build_tree("What causes tides?", &cancel).await.unwrap();
    assert!(expansion.cancelled);
    assert!(expansion.report.has(NodeId::ROOT, DegradationKind::Cancelled));
    assert_eq!(expansion.tree.len(), 1);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_any_call() {
    let llm = tides_llm();
    let search = ScriptedSearch::echo("google");
    let config = PipelineConfig {
        max_depth: 0,
        ..fast_config()
    };
    let orchestrator = orchestrator(llm.clone(), vec![search.clone()], config);

    let result = orchestrator
        .answer("What causes tides?", &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AppError::Config(_))));
    assert_eq!(llm.calls(), 0);
    assert_eq!(search.calls(), 0);
}

#[tokio::test]
async fn test_empty_question_is_rejected() {
    let llm = tides_llm();
    let orchestrator = orchestrator(llm.clone(), vec![ScriptedSearch::echo("google")], fast_config());

    let result = orchestrator.answer("   ", &CancellationToken::new()).await;
    assert!(matches!(result, Err(AppError::Config(_))));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_no_backends_is_rejected() {
    let llm = tides_llm();
    let orchestrator = crate::Orchestrator::new(
        llm.clone() as Arc<dyn frag_llm::LlmClient>,
        Vec::new(),
        prompts(),
        fast_config(),
        "test-model",
    );

    let result = orchestrator
        .answer("What causes tides?", &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(AppError::Config(_))));
    assert_eq!(llm.calls(), 0);
}
