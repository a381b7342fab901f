//! Prompt system for FRAG.
//!
//! Prompts are YAML definitions with Handlebars templates. Four are built
//! in (aspect expansion, aspect review, answer synthesis and answer
//! evaluation) and any of them can be overridden per workspace under
//! `.frag/prompts/`.

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_prompt, render_template};
pub use loader::{
    builtin_source, list_prompts, load_prompt, prompts_dir, validate_prompt, ANSWER_EVALUATE,
    ANSWER_SYNTHESIZE, ASPECTS_EXPAND, ASPECTS_REFLECT,
};
pub use types::{BuiltPrompt, PromptDefinition, PromptOrigin, PromptOutputSpec, PromptParameters};
