//! Per-node evidence store.
//!
//! Items are deduplicated by a fingerprint over the normalized source and
//! the normalized snippet text, and each item gets an id of the form
//! `<node>.<seq>` that is unique within the tree.

use crate::similarity;
use crate::tree::NodeId;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

/// Tree-unique evidence identifier, rendered as `<node>.<seq>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EvidenceId {
    pub node: NodeId,
    pub seq: u32,
}

impl EvidenceId {
    pub fn new(node: NodeId, seq: u32) -> Self {
        Self { node, seq }
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.seq)
    }
}

impl FromStr for EvidenceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']');
        let (node, seq) = trimmed
            .split_once('.')
            .ok_or_else(|| format!("invalid evidence id '{}'", s))?;
        let node = node
            .parse::<usize>()
            .map_err(|_| format!("invalid evidence id '{}'", s))?;
        let seq = seq
            .parse::<u32>()
            .map_err(|_| format!("invalid evidence id '{}'", s))?;
        Ok(Self::new(NodeId(node), seq))
    }
}

impl From<EvidenceId> for String {
    fn from(id: EvidenceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for EvidenceId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A retrieved snippet with its provenance. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: EvidenceId,

    /// URL or document id
    pub source_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub snippet: String,

    /// 1-based position after merging all backends
    pub rank: u32,

    pub backend: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<DateTime<Utc>>,

    pub fingerprint: String,
}

/// Raw material for an [`EvidenceItem`] before the store assigns an id.
#[derive(Debug, Clone)]
pub struct EvidenceCandidate {
    pub source_id: String,
    pub title: Option<String>,
    pub snippet: String,
    pub backend: String,
    pub retrieved_at: Option<DateTime<Utc>>,
}

/// Deduplicated, capped evidence for one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceStore {
    node: NodeId,
    cap: usize,
    items: Vec<EvidenceItem>,
}

impl EvidenceStore {
    pub fn new(node: NodeId, cap: usize) -> Self {
        Self {
            node,
            cap,
            items: Vec::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.cap
    }

    pub fn get(&self, id: EvidenceId) -> Option<&EvidenceItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains_fingerprint(&self, fingerprint: &str) -> bool {
        self.items.iter().any(|item| item.fingerprint == fingerprint)
    }

    /// Insert a candidate, returning the id it was stored under.
    ///
    /// Returns `None` without touching the store when the candidate has an
    /// empty snippet, duplicates an existing fingerprint, or the store is full.
    pub fn insert(&mut self, candidate: EvidenceCandidate) -> Option<EvidenceId> {
        let snippet = clean_text(&candidate.snippet);
        let source_id = candidate.source_id.trim().to_string();
        if snippet.is_empty() || source_id.is_empty() {
            return None;
        }

        let fingerprint = fingerprint(&source_id, &snippet);
        if self.contains_fingerprint(&fingerprint) {
            tracing::debug!("Skipping duplicate evidence from {}", source_id);
            return None;
        }
        if self.is_full() {
            return None;
        }

        let seq = self.items.len() as u32;
        let id = EvidenceId::new(self.node, seq);
        let title = candidate
            .title
            .map(|t| clean_text(&t))
            .filter(|t| !t.is_empty());

        self.items.push(EvidenceItem {
            id,
            source_id,
            title,
            snippet,
            rank: seq + 1,
            backend: candidate.backend,
            retrieved_at: candidate.retrieved_at,
            fingerprint,
        });

        Some(id)
    }
}

/// SHA-256 over the normalized source and the normalized snippet.
pub fn fingerprint(source_id: &str, snippet: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_source(source_id).as_bytes());
    hasher.update(b"\n");
    hasher.update(similarity::normalize(snippet).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical form of a source identifier.
///
/// URLs are reduced to host, non-default port, path and query: the scheme, a
/// leading `www.`, a trailing root dot, the fragment and trailing slashes are
/// dropped and the host is lowercased. Anything that does not parse as a URL
/// with a host is only trimmed.
pub fn normalize_source(source_id: &str) -> String {
    let trimmed = source_id.trim();
    let Ok(url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    let Some(host) = url_host(&url) else {
        return trimmed.to_string();
    };

    let mut normalized = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if let Some(port) = url.port() {
        normalized.push(':');
        normalized.push_str(&port.to_string());
    }
    normalized.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        normalized.push('?');
        normalized.push_str(query);
    }
    normalized
}

/// Lowercased host of a parsed URL without the trailing root dot.
pub(crate) fn url_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_end_matches('.').to_lowercase();
    (!host.is_empty()).then_some(host)
}

fn markup_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").ok()).as_ref()
}

/// Strip markup, decode common entities and collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let stripped = match markup_pattern() {
        Some(pattern) => pattern.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    };

    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
