//! Merge ordering for hits from several search backends.

use crate::config::RankingPolicy;
use crate::evidence::url_host;
use frag_search::SearchHit;
use std::collections::{HashMap, HashSet};
use url::Url;

/// A search hit with the backend it came from and its merge score.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub backend: String,
    pub hit: SearchHit,
    pub score: f64,
}

/// Order the hits of every backend into one list.
///
/// `results` must be in configured backend order. Each backend's hits are
/// first put in rank order; the normalized score of the hit at 0-based
/// position `i` out of `n` is `1 - i / n`. Ties keep backend order, then rank.
pub fn merge(
    results: Vec<(String, Vec<SearchHit>)>,
    policy: RankingPolicy,
    authority_share: f64,
) -> Vec<RankedHit> {
    let mut merged = Vec::new();

    for (backend, mut hits) in results {
        hits.sort_by_key(|h| h.rank);
        let n = hits.len() as f64;

        for (i, hit) in hits.into_iter().enumerate() {
            let normalized = 1.0 - i as f64 / n;
            let score = match policy {
                RankingPolicy::Authority => {
                    (1.0 - authority_share) * normalized
                        + authority_share * authority_score(&hit.source_id)
                }
                _ => normalized,
            };
            merged.push(RankedHit {
                backend: backend.clone(),
                hit,
                score,
            });
        }
    }

    if policy != RankingPolicy::BackendPriority {
        // stable, so equal scores keep backend and rank order
        merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    merged
}

/// Host part of a URL, lowercased and without a trailing root dot.
/// `None` for ids that are not URLs with a host.
pub fn host_of(source_id: &str) -> Option<String> {
    let url = Url::parse(source_id.trim()).ok()?;
    url_host(&url)
}

/// Two-label public suffixes that would otherwise be mistaken for a domain.
const COMPOUND_SUFFIXES: &[&str] = &[
    "ac.uk", "co.uk", "gov.uk", "org.uk", "com.au", "edu.au", "gov.au", "org.au", "co.jp",
    "ac.jp", "co.nz", "govt.nz", "com.br", "gov.br", "co.in", "gov.in", "com.cn", "edu.cn",
];

/// Split a host into its registrable label and public suffix.
///
/// `news.bbc.co.uk` gives `("bbc", "co.uk")`. Subdomains are dropped; IP
/// literals and single-label hosts come back whole with an empty suffix.
pub fn split_domain(host: &str) -> (&str, &str) {
    if host.starts_with('[') || host.parse::<std::net::Ipv4Addr>().is_ok() {
        return (host, "");
    }

    let suffix_len = COMPOUND_SUFFIXES
        .iter()
        .find(|suffix| {
            host.strip_suffix(*suffix)
                .is_some_and(|head| head.ends_with('.'))
        })
        .map(|suffix| suffix.len())
        .or_else(|| host.rsplit_once('.').map(|(_, last)| last.len()));

    let Some(suffix_len) = suffix_len else {
        return (host, "");
    };

    let split = host.len() - suffix_len;
    let suffix = &host[split..];
    let head = host[..split].trim_end_matches('.');
    let label = head.rsplit('.').next().unwrap_or(head);
    (label, suffix)
}

/// Trust weight of a source, from its public suffix and the keywords in
/// its registrable label.
pub fn authority_score(source_id: &str) -> f64 {
    let Some(host) = host_of(source_id) else {
        return 0.5;
    };
    let (label, suffix) = split_domain(&host);

    let mut score = match suffix {
        "gov" => 1.0,
        "edu" => 0.9,
        "org" => 0.8,
        "com" => 0.7,
        "net" => 0.6,
        _ => 0.5,
    };

    if ["news", "media", "press"].iter().any(|k| label.contains(k)) {
        score += 0.2;
    }
    if ["official", "government"].iter().any(|k| label.contains(k)) {
        score += 0.3;
    }

    f64::min(score, 1.0)
}

/// Coarse kind of site a source comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainCategory {
    Official,
    News,
    Blog,
    Forum,
    Social,
    Ecommerce,
    Other,
}

const CATEGORY_KEYWORDS: &[(DomainCategory, &[&str])] = &[
    (DomainCategory::News, &["news", "media", "press"]),
    (DomainCategory::Blog, &["blog", "medium", "wordpress"]),
    (DomainCategory::Forum, &["forum", "community", "discussion"]),
    (DomainCategory::Social, &["facebook", "twitter", "instagram"]),
    (DomainCategory::Ecommerce, &["shop", "store", "market"]),
];

/// Categorize a source by suffix first, then by registrable-label keywords.
pub fn domain_category(source_id: &str) -> DomainCategory {
    let Some(host) = host_of(source_id) else {
        return DomainCategory::Other;
    };
    let (label, suffix) = split_domain(&host);

    if matches!(suffix, "gov" | "edu" | "org") {
        return DomainCategory::Official;
    }

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| label.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(DomainCategory::Other)
}

/// Cap how many hits any one domain category contributes.
///
/// Each category present keeps at most `max(2, n / categories)` hits, where
/// `n` is the number of hits. Merge order is preserved.
pub fn balance_categories(hits: Vec<RankedHit>) -> Vec<RankedHit> {
    let categories: Vec<DomainCategory> = hits
        .iter()
        .map(|ranked| domain_category(&ranked.hit.source_id))
        .collect();

    let present: HashSet<DomainCategory> = categories.iter().copied().collect();
    if present.len() < 2 {
        return hits;
    }

    let limit = usize::max(2, hits.len() / present.len());
    let mut taken: HashMap<DomainCategory, usize> = HashMap::new();

    hits.into_iter()
        .zip(categories)
        .filter(|(_, category)| {
            let count = taken.entry(*category).or_default();
            *count += 1;
            *count <= limit
        })
        .map(|(ranked, _)| ranked)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(sources: &[&str]) -> Vec<SearchHit> {
        sources
            .iter()
            .enumerate()
            .map(|(i, s)| SearchHit::new(*s, format!("snippet {}", s), i as u32 + 1))
            .collect()
    }

    fn sources(ranked: &[RankedHit]) -> Vec<&str> {
        ranked.iter().map(|r| r.hit.source_id.as_str()).collect()
    }

    #[test]
    fn test_backend_priority_keeps_order() {
        let merged = merge(
            vec![
                ("a".to_string(), hits(&["a1", "a2", "a3"])),
                ("b".to_string(), hits(&["b1"])),
            ],
            RankingPolicy::BackendPriority,
            0.0,
        );
        assert_eq!(sources(&merged), vec!["a1", "a2", "a3", "b1"]);
    }

    #[test]
    fn test_score_normalized_interleaves() {
        let merged = merge(
            vec![
                ("a".to_string(), hits(&["a1", "a2"])),
                ("b".to_string(), hits(&["b1", "b2"])),
            ],
            RankingPolicy::ScoreNormalized,
            0.0,
        );
        assert_eq!(sources(&merged), vec!["a1", "b1", "a2", "b2"]);
        assert_eq!(merged[2].score, 0.5);
    }

    #[test]
    fn test_score_normalized_sorts_by_rank_first() {
        let mut unordered = hits(&["x", "y"]);
        unordered.reverse();
        let merged = merge(
            vec![("a".to_string(), unordered)],
            RankingPolicy::ScoreNormalized,
            0.0,
        );
        assert_eq!(sources(&merged), vec!["x", "y"]);
    }

    #[test]
    fn test_authority_prefers_trusted_hosts() {
        let merged = merge(
            vec![(
                "a".to_string(),
                hits(&["https://blog.example.com/p", "https://www.noaa.gov/tides"]),
            )],
            RankingPolicy::Authority,
            0.8,
        );
        assert_eq!(merged[0].hit.source_id, "https://www.noaa.gov/tides");
    }

    #[test]
    fn test_authority_score() {
        assert_eq!(authority_score("https://www.noaa.gov/x"), 1.0);
        assert_eq!(authority_score("https://mit.edu"), 0.9);
        assert_eq!(authority_score("https://example.net"), 0.6);
        assert_eq!(authority_score("https://example.io"), 0.5);
        assert!((authority_score("https://dailynews.com") - 0.9).abs() < 1e-9);
        assert_eq!(authority_score("https://official-site.org"), 1.0);
        assert_eq!(authority_score("doc-17"), 0.5);
    }

    #[test]
    fn test_keyword_bonus_ignores_subdomains() {
        assert_eq!(authority_score("https://news.example.com/a"), 0.7);
        assert_eq!(authority_score("https://official.example.net"), 0.6);
        assert!((authority_score("https://www.pressgazette.co.uk") - 0.7).abs() < 1e-9);
        assert!((authority_score("https://news.bbc.co.uk") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_split_domain() {
        assert_eq!(split_domain("news.example.com"), ("example", "com"));
        assert_eq!(split_domain("news.bbc.co.uk"), ("bbc", "co.uk"));
        assert_eq!(split_domain("example.com"), ("example", "com"));
        assert_eq!(split_domain("localhost"), ("localhost", ""));
        assert_eq!(split_domain("10.0.0.1"), ("10.0.0.1", ""));
        assert_eq!(split_domain("[2001:db8::1]"), ("[2001:db8::1]", ""));
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://User@Example.COM:8080/a?b").as_deref(), Some("example.com"));
        assert_eq!(host_of("https://NOAA.gov./tides").as_deref(), Some("noaa.gov"));
        assert_eq!(
            host_of("http://[2001:db8::1]:8080/x").as_deref(),
            Some("[2001:db8::1]")
        );
        assert_eq!(host_of("not a url"), None);
        assert_eq!(host_of("urn:isbn:0451450523"), None);
    }

    #[test]
    fn test_domain_category() {
        assert_eq!(domain_category("https://www.noaa.gov/tides"), DomainCategory::Official);
        assert_eq!(domain_category("https://dailynews.com/a"), DomainCategory::News);
        assert_eq!(domain_category("https://myblog.net/p"), DomainCategory::Blog);
        assert_eq!(domain_category("https://www.facebook.com/x"), DomainCategory::Social);
        assert_eq!(domain_category("https://news.example.com"), DomainCategory::Other);
        assert_eq!(domain_category("doc-3"), DomainCategory::Other);
    }

    fn ranked(sources: &[&str]) -> Vec<RankedHit> {
        merge(
            vec![("a".to_string(), hits(sources))],
            RankingPolicy::BackendPriority,
            0.0,
        )
    }

    #[test]
    fn test_balance_categories_caps_dominant_category() {
        let balanced = balance_categories(ranked(&[
            "https://dailynews.com/1",
            "https://tidemedia.com/2",
            "https://morningpress.com/3",
            "https://citynews.com/4",
            "https://www.noaa.gov/5",
            "https://myblog.net/6",
        ]));

        // 6 hits over 3 categories: at most 2 each, order kept
        assert_eq!(
            sources(&balanced),
            vec![
                "https://dailynews.com/1",
                "https://tidemedia.com/2",
                "https://www.noaa.gov/5",
                "https://myblog.net/6",
            ]
        );
    }

    #[test]
    fn test_balance_categories_leaves_single_category_alone() {
        let all_news = ranked(&[
            "https://dailynews.com/1",
            "https://tidemedia.com/2",
            "https://morningpress.com/3",
        ]);
        assert_eq!(balance_categories(all_news).len(), 3);
    }
}
