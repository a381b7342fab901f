//! Prompt loader for built-in and workspace prompt definitions.

use crate::types::{PromptDefinition, PromptOrigin};
use frag_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Prompt for splitting an aspect into sub-aspects.
pub const ASPECTS_EXPAND: &str = "aspects.expand";

/// Prompt for reviewing a node's proposed sub-aspects.
pub const ASPECTS_REFLECT: &str = "aspects.reflect";

/// Prompt for answering one aspect from evidence and child answers.
pub const ANSWER_SYNTHESIZE: &str = "answer.synthesize";

/// Prompt for grading a final answer.
pub const ANSWER_EVALUATE: &str = "answer.evaluate";

const BUILTINS: &[(&str, &str)] = &[
    (ASPECTS_EXPAND, include_str!("../prompts/aspects.expand.yml")),
    (ASPECTS_REFLECT, include_str!("../prompts/aspects.reflect.yml")),
    (ANSWER_SYNTHESIZE, include_str!("../prompts/answer.synthesize.yml")),
    (ANSWER_EVALUATE, include_str!("../prompts/answer.evaluate.yml")),
];

/// Directory holding workspace prompt overrides.
pub fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(frag_core::config::FRAG_DIR).join("prompts")
}

/// Load a prompt definition by ID.
///
/// A file named `<id>.yml` under `.frag/prompts/` takes precedence over the
/// built-in definition with the same ID.
///
/// # Example
/// ```no_run
/// use frag_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "aspects.expand")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    let (contents, origin) = if prompt_file.is_file() {
        tracing::debug!("Loading prompt from: {:?}", prompt_file);
        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;
        (contents, PromptOrigin::Workspace)
    } else {
        let contents = builtin_source(prompt_id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;
        (contents.to_string(), PromptOrigin::Builtin)
    };

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML '{}': {}", prompt_id, e))
    })?;

    validate_prompt(&definition)?;

    if definition.id != prompt_id {
        tracing::warn!(
            "Prompt file '{}' declares id '{}'",
            prompt_id,
            definition.id
        );
    }

    tracing::debug!(
        "Loaded prompt: {} ({:?}, {})",
        definition.id,
        origin,
        definition.title
    );

    Ok(definition)
}

/// Source text of a built-in prompt.
pub fn builtin_source(prompt_id: &str) -> Option<&'static str> {
    BUILTINS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .map(|(_, source)| *source)
}

/// List every available prompt ID with the place it is loaded from.
///
/// Built-ins come first in a fixed order, followed by workspace-only prompts
/// sorted by ID.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<(String, PromptOrigin)>> {
    let overrides = workspace_prompt_ids(workspace_path);

    let mut prompts: Vec<(String, PromptOrigin)> = BUILTINS
        .iter()
        .map(|(id, _)| {
            let origin = if overrides.iter().any(|o| o == id) {
                PromptOrigin::Workspace
            } else {
                PromptOrigin::Builtin
            };
            (id.to_string(), origin)
        })
        .collect();

    let mut extra: Vec<String> = overrides
        .into_iter()
        .filter(|id| builtin_source(id).is_none())
        .collect();
    extra.sort();

    prompts.extend(extra.into_iter().map(|id| (id, PromptOrigin::Workspace)));
    Ok(prompts)
}

fn workspace_prompt_ids(workspace_path: &Path) -> Vec<String> {
    let dir = prompts_dir(workspace_path);
    if !dir.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("yml"))
        .filter_map(|e| {
            e.path()
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .collect()
}

/// Validate a prompt definition.
pub fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if let Some(t) = def.parameters.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(AppError::Prompt(format!(
                "Prompt '{}' temperature {} is outside 0.0..=2.0",
                def.id, t
            )));
        }
    }

    Ok(())
}
