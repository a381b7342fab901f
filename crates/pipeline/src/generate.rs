//! Generation calls with timeout, retry and output validation.

use crate::cancel::CancellationToken;
use crate::retry::{call_with_retry, RetryPolicy};
use frag_core::{AppError, BackendError};
use frag_llm::{LlmClient, LlmRequest};
use frag_prompt::BuiltPrompt;
use std::sync::Arc;

/// A generation backend bound to a model and a retry policy.
#[derive(Clone)]
pub struct Generator {
    client: Arc<dyn LlmClient>,
    model: String,
    policy: RetryPolicy,
}

impl Generator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            client,
            model: model.into(),
            policy,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> &str {
        self.client.provider_name()
    }

    fn request(&self, prompt: &BuiltPrompt) -> LlmRequest {
        let mut request = LlmRequest::new(prompt.user.clone(), self.model.clone());
        if let Some(ref system) = prompt.system {
            request = request.with_system(system.clone());
        }
        if let Some(t) = prompt.parameters.temperature {
            request = request.with_temperature(t);
        }
        if let Some(max) = prompt.parameters.max_tokens {
            request = request.with_max_tokens(max);
        }
        if prompt.json_output {
            request = request.with_json_output();
        }
        request
    }

    /// Send `prompt` and validate the reply with `parse`.
    ///
    /// A reply that `parse` rejects counts as a failed attempt and is retried
    /// like a transport error.
    pub async fn generate<T, P>(
        &self,
        prompt: &BuiltPrompt,
        cancel: &CancellationToken,
        parse: P,
    ) -> Result<T, BackendError>
    where
        P: Fn(&str) -> Result<T, BackendError>,
    {
        let request = self.request(prompt);
        let client = &self.client;
        let request = &request;
        let parse = &parse;

        tracing::debug!(
            prompt = %prompt.source_prompt_id,
            model = %self.model,
            "Sending generation request"
        );

        call_with_retry(client.provider_name(), &self.policy, cancel, move || async move {
            let response = client.complete(request).await?;
            parse(&response.content).map_err(AppError::from)
        })
        .await
    }
}

/// Remove a Markdown code fence around a model reply.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse a model reply as JSON, tolerating fences and surrounding prose.
pub fn parse_json_reply(text: &str) -> Option<serde_json::Value> {
    let body = strip_code_fence(text);
    if let Ok(value) = serde_json::from_str(body) {
        return Some(value);
    }

    // fall back to the outermost object or array
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (body.find(open), body.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&body[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}
