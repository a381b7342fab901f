//! Evidence retrieval across search backends.

use crate::cancel::CancellationToken;
use crate::config::{PipelineConfig, QueryMode, RankingPolicy};
use crate::evidence::{EvidenceCandidate, EvidenceStore};
use crate::ranking::{balance_categories, merge, RankedHit};
use crate::retry::{call_with_retry, RetryPolicy};
use crate::tree::{AspectTree, NodeId};
use chrono::Utc;
use frag_core::BackendError;
use frag_search::SearchBackend;
use futures::future::join_all;
use std::sync::Arc;

/// How complete a node's evidence is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStatus {
    /// Every backend answered (possibly with no hits)
    Complete,
    /// At least one backend failed, at least one answered
    Partial,
    /// Every backend failed
    Degraded,
    /// The run was cancelled before every backend answered
    Cancelled,
}

/// Merged hits for one query plus the backends that failed.
#[derive(Debug)]
pub struct Retrieval {
    pub hits: Vec<RankedHit>,
    pub failures: Vec<BackendError>,
    pub status: RetrievalStatus,
}

/// A node's filled evidence store.
#[derive(Debug)]
pub struct NodeEvidence {
    pub node: NodeId,
    pub store: EvidenceStore,
    pub failures: Vec<BackendError>,
    pub status: RetrievalStatus,
}

/// Fans a query out to every configured search backend.
pub struct Retriever {
    backends: Vec<Arc<dyn SearchBackend>>,
    policy: RetryPolicy,
    ranking: RankingPolicy,
    authority_weight: f64,
    balance_categories: bool,
    k: usize,
    cap: usize,
}

impl Retriever {
    pub fn new(backends: Vec<Arc<dyn SearchBackend>>, config: &PipelineConfig) -> Self {
        Self {
            backends,
            policy: RetryPolicy::new(
                config.search_retries,
                config.search_timeout(),
                config.backoff_base(),
            ),
            ranking: config.ranking,
            authority_weight: config.authority_weight,
            balance_categories: config.balance_categories,
            k: config.search_k as usize,
            cap: config.per_node_evidence_cap as usize,
        }
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Query all backends concurrently and merge their hits.
    pub async fn retrieve(&self, query: &str, cancel: &CancellationToken) -> Retrieval {
        let calls = self.backends.iter().map(|backend| async move {
            let result = call_with_retry(backend.name(), &self.policy, cancel, move || {
                backend.search(query, self.k)
            })
            .await;
            (backend.name().to_string(), result)
        });

        let mut answered = Vec::new();
        let mut failures = Vec::new();

        // join_all keeps configured backend order
        for (name, result) in join_all(calls).await {
            match result {
                Ok(mut hits) => {
                    hits.truncate(self.k);
                    tracing::debug!("Backend '{}' returned {} hits", name, hits.len());
                    answered.push((name, hits));
                }
                Err(e) => {
                    tracing::warn!("Backend '{}' failed: {}", name, e);
                    failures.push(e);
                }
            }
        }

        let status = if failures.is_empty() {
            RetrievalStatus::Complete
        } else if failures
            .iter()
            .any(|e| matches!(e, BackendError::Cancelled { .. }))
        {
            RetrievalStatus::Cancelled
        } else if answered.is_empty() {
            RetrievalStatus::Degraded
        } else {
            RetrievalStatus::Partial
        };

        let mut hits = merge(answered, self.ranking, self.authority_weight);
        if self.balance_categories {
            let before = hits.len();
            hits = balance_categories(hits);
            tracing::debug!("Category balance kept {} of {} hits", hits.len(), before);
        }

        Retrieval {
            hits,
            failures,
            status,
        }
    }

    /// Build the evidence store for one node.
    ///
    /// The result is owned; installing it into the tree is up to the caller.
    pub async fn retrieve_for_node(
        &self,
        node: NodeId,
        query: &str,
        cancel: &CancellationToken,
    ) -> NodeEvidence {
        let retrieval = self.retrieve(query, cancel).await;
        let mut store = EvidenceStore::new(node, self.cap);
        let now = Utc::now();

        for ranked in retrieval.hits {
            if store.is_full() {
                break;
            }
            let title = Some(ranked.hit.title).filter(|t| !t.trim().is_empty());
            store.insert(EvidenceCandidate {
                source_id: ranked.hit.source_id,
                title,
                snippet: ranked.hit.snippet,
                backend: ranked.backend,
                retrieved_at: Some(now),
            });
        }

        tracing::debug!(
            "Node {} has {} evidence items ({:?})",
            node,
            store.len(),
            retrieval.status
        );

        NodeEvidence {
            node,
            store,
            failures: retrieval.failures,
            status: retrieval.status,
        }
    }
}

/// Text sent to the search backends for a node.
pub fn query_for(tree: &AspectTree, node: NodeId, mode: QueryMode) -> String {
    match mode {
        QueryMode::Question => tree
            .get(node)
            .map(|n| n.question.clone())
            .unwrap_or_default(),
        QueryMode::Path => tree.path_questions(node).join(" "),
    }
}
