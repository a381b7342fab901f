//! Model review of the sub-aspects proposed for a node.
//!
//! A review scores the proposal for fairness and diversity, scores each
//! sub-aspect for relevance, and recommends keeping the proposal as it is,
//! replacing it, or pruning it down to its first entry.

use crate::evaluate::numeric;
use crate::expand::{select_aspects, Proposal};
use crate::generate::parse_json_reply;
use crate::report::DiscardReason;
use crate::similarity::is_near_duplicate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Keep,
    Modify,
    Prune,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    pub recommendation: Recommendation,
    pub fairness: Option<f64>,
    pub diversity: Option<f64>,
    /// Relevance of each reviewed aspect, in the order they were listed
    pub relevance: Vec<Option<f64>>,
    /// Replacements, used with [`Recommendation::Modify`]
    pub aspects: Vec<String>,
}

pub fn parse_reflection(reply: &str) -> Result<Reflection, String> {
    let Some(Value::Object(root)) = parse_json_reply(reply) else {
        return Err("review reply is not a JSON object".to_string());
    };

    let recommendation = match root
        .get("recommendation")
        .and_then(Value::as_str)
        .map(|r| r.trim().to_lowercase())
        .as_deref()
    {
        Some("keep") => Recommendation::Keep,
        Some("modify") => Recommendation::Modify,
        Some("prune") => Recommendation::Prune,
        Some(other) => return Err(format!("unknown recommendation '{}'", other)),
        None => return Err("review reply has no \"recommendation\"".to_string()),
    };

    let aspects = match root.get("aspects") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(_) => return Err("\"aspects\" is not a list".to_string()),
    };

    let relevance = match root.get("relevance") {
        Some(Value::Array(items)) => items.iter().map(numeric).collect(),
        _ => Vec::new(),
    };

    Ok(Reflection {
        recommendation,
        fairness: root.get("fairness").and_then(numeric),
        diversity: root.get("diversity").and_then(numeric),
        relevance,
        aspects,
    })
}

/// Apply a review to the sub-aspects it was asked about.
///
/// Aspects scored below `relevance_threshold` go first; an aspect without a
/// score is kept. Of the rest, `Keep` leaves them alone, `Prune` keeps only
/// the first, and `Modify` swaps in the replacements when at least one of
/// them passes [`select_aspects`]. Every dropped aspect is listed with its
/// reason.
pub fn apply_reflection(
    candidates: Vec<String>,
    reflection: Reflection,
    relevance_threshold: f64,
    own_question: &str,
    ancestors: &[String],
    similarity_threshold: f64,
) -> Proposal {
    let mut proposal = Proposal::default();
    let mut survivors = Vec::new();

    for (index, aspect) in candidates.into_iter().enumerate() {
        match reflection.relevance.get(index).copied().flatten() {
            Some(score) if score < relevance_threshold => {
                proposal.discarded.push((aspect, DiscardReason::Irrelevant));
            }
            _ => survivors.push(aspect),
        }
    }

    match reflection.recommendation {
        Recommendation::Keep => proposal.accepted = survivors,
        Recommendation::Prune => {
            let mut rest = survivors.into_iter();
            proposal.accepted.extend(rest.next());
            proposal
                .discarded
                .extend(rest.map(|aspect| (aspect, DiscardReason::Pruned)));
        }
        Recommendation::Modify => {
            let replacements = select_aspects(
                reflection.aspects,
                own_question,
                ancestors,
                similarity_threshold,
            );
            if replacements.accepted.is_empty() {
                proposal.accepted = survivors;
                return proposal;
            }

            for aspect in survivors {
                let carried_over = replacements
                    .accepted
                    .iter()
                    .any(|r| is_near_duplicate(&aspect, r, similarity_threshold));
                if !carried_over {
                    proposal.discarded.push((aspect, DiscardReason::Pruned));
                }
            }
            proposal.discarded.extend(replacements.discarded);
            proposal.accepted = replacements.accepted;
        }
    }

    proposal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aspects(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn review(reply: &str, candidates: &[&str]) -> Proposal {
        let reflection = parse_reflection(reply).unwrap();
        apply_reflection(aspects(candidates), reflection, 7.0, "What causes tides?", &[], 0.8)
    }

    #[test]
    fn test_parse_reflection() {
        let reflection = parse_reflection(
            r#"{"fairness": "8", "diversity": 6, "relevance": [9, null, 4],
                "recommendation": " Keep ", "aspects": []}"#,
        )
        .unwrap();
        assert_eq!(reflection.recommendation, Recommendation::Keep);
        assert_eq!(reflection.fairness, Some(8.0));
        assert_eq!(reflection.relevance, vec![Some(9.0), None, Some(4.0)]);
    }

    #[test]
    fn test_parse_rejects_bad_replies() {
        assert!(parse_reflection("keep").is_err());
        assert!(parse_reflection(r#"{"fairness": 8}"#).is_err());
        assert!(parse_reflection(r#"{"recommendation": "merge"}"#).is_err());
        assert!(parse_reflection(r#"{"recommendation": "modify", "aspects": "x"}"#).is_err());
    }

    #[test]
    fn test_keep_drops_only_irrelevant() {
        let proposal = review(
            r#"{"recommendation": "keep", "relevance": [9, 3]}"#,
            &["Role of the moon", "History of surfing"],
        );
        assert_eq!(proposal.accepted, vec!["Role of the moon"]);
        assert_eq!(
            proposal.discarded,
            vec![("History of surfing".to_string(), DiscardReason::Irrelevant)]
        );
    }

    #[test]
    fn test_prune_keeps_first_relevant() {
        let proposal = review(
            r#"{"recommendation": "prune", "relevance": [2, 8, 8]}"#,
            &["History of surfing", "Role of the moon", "Lunar gravity"],
        );
        assert_eq!(proposal.accepted, vec!["Role of the moon"]);
        let reasons: Vec<DiscardReason> = proposal.discarded.iter().map(|(_, r)| *r).collect();
        assert_eq!(reasons, vec![DiscardReason::Irrelevant, DiscardReason::Pruned]);
    }

    #[test]
    fn test_modify_replaces_proposal() {
        let proposal = review(
            r#"{"recommendation": "modify",
                "aspects": ["Role of the moon", "Shape of ocean basins", "what causes tides"]}"#,
            &["Role of the moon", "Moon phases and calendars"],
        );
        assert_eq!(proposal.accepted, vec!["Role of the moon", "Shape of ocean basins"]);
        assert_eq!(
            proposal.discarded,
            vec![
                ("Moon phases and calendars".to_string(), DiscardReason::Pruned),
                ("what causes tides".to_string(), DiscardReason::Restatement),
            ]
        );
    }

    #[test]
    fn test_modify_without_valid_replacements_keeps_proposal() {
        let proposal = review(
            r#"{"recommendation": "modify", "aspects": ["What causes tides?"]}"#,
            &["Role of the moon"],
        );
        assert_eq!(proposal.accepted, vec!["Role of the moon"]);
        assert!(proposal.discarded.is_empty());
    }
}
