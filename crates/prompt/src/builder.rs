//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use frag_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde::Serialize;

/// Build a prompt from a definition and template variables.
///
/// Both the system and the user template are rendered with Handlebars
/// against the same variables, so templates can iterate over nested data
/// (`{{#each evidence}}`) as well as plain strings.
///
/// # Example
/// ```no_run
/// use frag_prompt::{build_prompt, PromptDefinition};
///
/// # fn example(def: PromptDefinition) -> Result<(), Box<dyn std::error::Error>> {
/// let vars = serde_json::json!({ "question": "What causes tides?" });
/// let built = build_prompt(&def, &vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt<T: Serialize>(definition: &PromptDefinition, variables: &T) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let user = render_template(&definition.template, variables)?;

    let system = match definition.system {
        Some(ref template) => {
            let rendered = render_template(template, variables)?;
            (!rendered.trim().is_empty()).then_some(rendered)
        }
        None => None,
    };

    Ok(BuiltPrompt {
        system,
        user,
        parameters: definition.parameters.clone(),
        json_output: definition.output.is_json(),
        source_prompt_id: definition.id.clone(),
    })
}

/// Render a Handlebars template with variables.
pub fn render_template<T: Serialize>(template: &str, variables: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Prompts are plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(collapse_blank_lines(&rendered))
}

/// Squash runs of blank lines left behind by block helpers.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PromptOutputSpec, PromptParameters};
    use serde_json::json;

    fn create_test_definition(system: Option<&str>) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            parameters: PromptParameters {
                temperature: Some(0.3),
                max_tokens: None,
            },
            system: system.map(str::to_string),
            template: "Question: {{question}}".to_string(),
            output: PromptOutputSpec {
                format: "json".to_string(),
            },
        }
    }

    #[test]
    fn test_render_simple_template() {
        let result = render_template("Question: {{question}}", &json!({"question": "Why?"}));
        assert_eq!(result.unwrap(), "Question: Why?");
    }

    #[test]
    fn test_render_does_not_escape() {
        let result = render_template("{{text}}", &json!({"text": "a < b & \"c\""})).unwrap();
        assert_eq!(result, "a < b & \"c\"");
    }

    #[test]
    fn test_render_each_block() {
        let template = "{{#each items}}[{{id}}] {{snippet}}\n{{/each}}";
        let vars = json!({"items": [{"id": "1.0", "snippet": "a"}, {"id": "2.1", "snippet": "b"}]});
        let result = render_template(template, &vars).unwrap();
        assert_eq!(result, "[1.0] a\n[2.1] b");
    }

    #[test]
    fn test_render_invalid_template() {
        let result = render_template("{{#each items}}", &json!({}));
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb\n"), "a\n\nb");
    }

    #[test]
    fn test_build_prompt_with_system() {
        let def = create_test_definition(Some("{{#if cautious}}Be cautious.{{/if}}"));

        let built = build_prompt(&def, &json!({"question": "Why?", "cautious": true})).unwrap();
        assert_eq!(built.user, "Question: Why?");
        assert_eq!(built.system.as_deref(), Some("Be cautious."));
        assert!(built.json_output);
        assert_eq!(built.parameters.temperature, Some(0.3));
        assert_eq!(built.source_prompt_id, "test.prompt");
    }

    #[test]
    fn test_empty_system_is_dropped() {
        let def = create_test_definition(Some("{{#if cautious}}Be cautious.{{/if}}"));

        let built = build_prompt(&def, &json!({"question": "Why?", "cautious": false})).unwrap();
        assert!(built.system.is_none());
    }
}
