//! Post-hoc grading of a final answer.

use crate::cancel::CancellationToken;
use crate::generate::{parse_json_reply, Generator};
use frag_core::{AppResult, BackendError};
use frag_prompt::{build_prompt, PromptDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Graded criteria and their weight in the overall score.
pub const CRITERIA: [(&str, f64); 5] = [
    ("relevance", 0.25),
    ("accuracy", 0.25),
    ("perspective_diversity", 0.20),
    ("source_diversity", 0.15),
    ("fairness", 0.15),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: String,
    /// 1 to 10
    pub score: f64,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// In [`CRITERIA`] order
    pub scores: Vec<CriterionScore>,
    /// Weighted mean of the scores, two decimals
    pub overall: f64,
    #[serde(default)]
    pub summary: String,
}

/// Ask the generation backend to grade `answer` for `question`.
pub async fn evaluate(
    generator: &Generator,
    prompt: &PromptDefinition,
    question: &str,
    answer: &str,
    cancel: &CancellationToken,
) -> AppResult<Evaluation> {
    let built = build_prompt(prompt, &json!({"question": question, "answer": answer}))?;
    let provider = generator.provider();

    let evaluation = generator
        .generate(&built, cancel, |reply| {
            parse_evaluation(reply).map_err(|detail| BackendError::malformed(provider, detail))
        })
        .await?;

    tracing::info!("Answer evaluated: overall {:.2}", evaluation.overall);
    Ok(evaluation)
}

/// Parse an evaluation reply and recompute the overall score.
pub fn parse_evaluation(reply: &str) -> Result<Evaluation, String> {
    let Some(Value::Object(root)) = parse_json_reply(reply) else {
        return Err("evaluation reply is not a JSON object".to_string());
    };

    let scores_obj = root
        .get("scores")
        .and_then(Value::as_object)
        .ok_or_else(|| "evaluation reply has no \"scores\" object".to_string())?;

    let mut scores = Vec::with_capacity(CRITERIA.len());
    for (criterion, _) in CRITERIA {
        let entry = scores_obj
            .get(criterion)
            .ok_or_else(|| format!("missing criterion '{}'", criterion))?;

        let (score, explanation) = match entry {
            Value::Object(obj) => (
                obj.get("score").and_then(numeric),
                obj.get("explanation")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
            other => (numeric(other), String::new()),
        };

        let score = score.ok_or_else(|| format!("criterion '{}' has no numeric score", criterion))?;
        if !(1.0..=10.0).contains(&score) {
            return Err(format!("criterion '{}' score {} is outside 1-10", criterion, score));
        }

        scores.push(CriterionScore {
            criterion: criterion.to_string(),
            score,
            explanation,
        });
    }

    let summary = root
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Evaluation {
        overall: weighted_overall(&scores),
        scores,
        summary,
    })
}

pub(crate) fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Weighted mean over [`CRITERIA`], rounded to two decimals.
pub fn weighted_overall(scores: &[CriterionScore]) -> f64 {
    let total: f64 = CRITERIA
        .iter()
        .filter_map(|(name, weight)| {
            scores
                .iter()
                .find(|s| s.criterion == *name)
                .map(|s| s.score * weight)
        })
        .sum();
    (total * 100.0).round() / 100.0
}
