use super::support::*;
use crate::cancel::CancellationToken;
use crate::config::{PipelineConfig, RankingPolicy};
use crate::retrieve::{RetrievalStatus, Retriever};
use crate::tree::NodeId;
use frag_search::{SearchBackend, SearchHit};
use std::sync::Arc;

fn retriever(backends: Vec<Arc<ScriptedSearch>>, config: &PipelineConfig) -> Retriever {
    let backends = backends
        .into_iter()
        .map(|b| b as Arc<dyn SearchBackend>)
        .collect();
    Retriever::new(backends, config)
}

fn fixed(name: &str, hits: Vec<(&'static str, &'static str)>) -> Arc<ScriptedSearch> {
    ScriptedSearch::new(name, move |_| {
        Ok(hits
            .iter()
            .enumerate()
            .map(|(i, (source, snippet))| SearchHit::new(*source, *snippet, i as u32 + 1))
            .collect())
    })
}

#[tokio::test]
async fn test_same_document_from_two_backends_is_stored_once() {
    let google = fixed(
        "google",
        vec![("https://www.noaa.gov/tides/", "The <b>moon</b> drives tides.")],
    );
    let bing = fixed(
        "bing",
        vec![
            ("http://noaa.gov/tides#top", "The moon   drives tides."),
            ("https://nasa.gov/sun", "The sun adds a smaller pull."),
        ],
    );
    let retriever = retriever(vec![google, bing], &fast_config());

    let evidence = retriever
        .retrieve_for_node(NodeId(3), "What causes tides?", &CancellationToken::new())
        .await;

    assert_eq!(evidence.status, RetrievalStatus::Complete);
    assert_eq!(evidence.store.len(), 2);

    let ids: Vec<String> = evidence.store.items().iter().map(|e| e.id.to_string()).collect();
    assert_eq!(ids, vec!["3.0", "3.1"]);
    assert_eq!(evidence.store.items()[0].snippet, "The moon drives tides.");
    assert_eq!(evidence.store.items()[0].backend, "google");
}

#[tokio::test]
async fn test_retrieval_is_deterministic() {
    let config = fast_config();
    let retriever = retriever(
        vec![ScriptedSearch::echo("google"), ScriptedSearch::echo("bing")],
        &config,
    );
    let cancel = CancellationToken::new();

    let first = retriever.retrieve_for_node(NodeId(1), "Role of the moon", &cancel).await;
    let second = retriever.retrieve_for_node(NodeId(1), "Role of the moon", &cancel).await;

    let key = |e: &crate::evidence::EvidenceItem| (e.id, e.source_id.clone(), e.fingerprint.clone());
    let a: Vec<_> = first.store.items().iter().map(key).collect();
    let b: Vec<_> = second.store.items().iter().map(key).collect();
    assert_eq!(a.len(), 4);
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_score_normalized_interleaves_backends() {
    let google = fixed(
        "google",
        vec![("https://a.com/1", "g one"), ("https://a.com/2", "g two")],
    );
    let bing = fixed(
        "bing",
        vec![
            ("https://b.com/1", "b one"),
            ("https://b.com/2", "b two"),
            ("https://b.com/3", "b three"),
        ],
    );
    let retriever = retriever(vec![google, bing], &fast_config());

    let retrieval = retriever.retrieve("anything", &CancellationToken::new()).await;
    let order: Vec<&str> = retrieval.hits.iter().map(|h| h.hit.snippet.as_str()).collect();
    assert_eq!(order, vec!["g one", "b one", "b two", "g two", "b three"]);
}

#[tokio::test]
async fn test_backend_priority_keeps_backend_order() {
    let google = fixed(
        "google",
        vec![("https://a.com/1", "g one"), ("https://a.com/2", "g two")],
    );
    let bing = fixed("bing", vec![("https://b.com/1", "b one")]);
    let config = PipelineConfig {
        ranking: RankingPolicy::BackendPriority,
        ..fast_config()
    };
    let retriever = retriever(vec![google, bing], &config);

    let retrieval = retriever.retrieve("anything", &CancellationToken::new()).await;
    let order: Vec<&str> = retrieval.hits.iter().map(|h| h.hit.snippet.as_str()).collect();
    assert_eq!(order, vec!["g one", "g two", "b one"]);
}

#[tokio::test]
async fn test_evidence_cap_is_respected() {
    let config = PipelineConfig {
        per_node_evidence_cap: 3,
        ..fast_config()
    };
    let retriever = retriever(
        vec![ScriptedSearch::echo("google"), ScriptedSearch::echo("bing")],
        &config,
    );

    let evidence = retriever
        .retrieve_for_node(NodeId::ROOT, "What causes tides?", &CancellationToken::new())
        .await;
    assert_eq!(evidence.store.len(), 3);
}

#[tokio::test]
async fn test_partial_failure_is_reported() {
    let retriever = retriever(
        vec![ScriptedSearch::echo("google"), ScriptedSearch::failing("bing")],
        &fast_config(),
    );

    let retrieval = retriever.retrieve("Role of the sun", &CancellationToken::new()).await;
    assert_eq!(retrieval.status, RetrievalStatus::Partial);
    assert_eq!(retrieval.failures.len(), 1);
    assert_eq!(retrieval.hits.len(), 2);
}

#[tokio::test]
async fn test_cancelled_retrieval_makes_no_calls() {
    let search = ScriptedSearch::echo("google");
    let retriever = retriever(vec![search.clone()], &fast_config());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let retrieval = retriever.retrieve("Role of the sun", &cancel).await;
    assert_eq!(retrieval.status, RetrievalStatus::Cancelled);
    assert!(retrieval.hits.is_empty());
    assert_eq!(search.calls(), 0);
}

#[tokio::test]
async fn test_default_port_and_root_dot_dedup_across_backends() {
    let google = fixed("google", vec![("https://noaa.gov/tides", "Tides rise twice a day.")]);
    let bing = fixed(
        "bing",
        vec![
            ("https://noaa.gov:443/tides", "Tides rise twice a day."),
            ("https://NOAA.gov./tides", "Tides rise twice a day."),
        ],
    );
    let retriever = retriever(vec![google, bing], &fast_config());

    let evidence = retriever
        .retrieve_for_node(NodeId::ROOT, "What causes tides?", &CancellationToken::new())
        .await;
    assert_eq!(evidence.store.len(), 1);
    assert_eq!(evidence.store.items()[0].source_id, "https://noaa.gov/tides");
}

fn news_heavy() -> Arc<ScriptedSearch> {
    fixed(
        "google",
        vec![
            ("https://dailynews.com/1", "news one"),
            ("https://tidemedia.com/2", "news two"),
            ("https://morningpress.com/3", "news three"),
            ("https://citynews.com/4", "news four"),
            ("https://www.noaa.gov/5", "official"),
            ("https://myblog.net/6", "blog"),
        ],
    )
}

#[tokio::test]
async fn test_category_balance_limits_one_kind_of_site() {
    let config = PipelineConfig {
        search_k: 6,
        per_node_evidence_cap: 5,
        balance_categories: true,
        ..fast_config()
    };
    let retriever = retriever(vec![news_heavy()], &config);

    let evidence = retriever
        .retrieve_for_node(NodeId::ROOT, "What causes tides?", &CancellationToken::new())
        .await;
    let snippets: Vec<&str> = evidence.store.items().iter().map(|e| e.snippet.as_str()).collect();
    assert_eq!(snippets, vec!["news one", "news two", "official", "blog"]);
}

#[tokio::test]
async fn test_category_balance_is_off_by_default() {
    let config = PipelineConfig {
        search_k: 6,
        per_node_evidence_cap: 5,
        ..fast_config()
    };
    let retriever = retriever(vec![news_heavy()], &config);

    let evidence = retriever
        .retrieve_for_node(NodeId::ROOT, "What causes tides?", &CancellationToken::new())
        .await;
    assert_eq!(evidence.store.len(), 5);
    assert_eq!(evidence.store.items()[3].snippet, "news four");
}
