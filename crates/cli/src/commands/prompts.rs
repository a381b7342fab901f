//! Prompts command handler.

use clap::{Args, Subcommand};
use frag_core::{config::AppConfig, AppError, AppResult};
use frag_prompt::{builtin_source, list_prompts, load_prompt, prompts_dir};

/// List, show and check prompt templates
#[derive(Args, Debug)]
pub struct PromptsCommand {
    #[command(subcommand)]
    pub action: Option<PromptsAction>,
}

#[derive(Subcommand, Debug)]
pub enum PromptsAction {
    /// List available prompts and where each is loaded from (default)
    List,

    /// Print the effective definition of a prompt
    Show {
        /// Prompt ID (e.g., aspects.expand)
        id: String,
    },

    /// Copy a built-in prompt into .frag/prompts/ for editing
    Eject {
        /// Prompt ID
        id: String,

        /// Overwrite an existing override
        #[arg(long)]
        force: bool,
    },

    /// Load and validate every available prompt
    Check,
}

impl PromptsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match self.action.as_ref().unwrap_or(&PromptsAction::List) {
            PromptsAction::List => {
                for (id, origin) in list_prompts(&config.workspace)? {
                    println!("{:<20} {:?}", id, origin);
                }
            }
            PromptsAction::Show { id } => {
                let definition = load_prompt(&config.workspace, id)?;
                let yaml = serde_yaml::to_string(&definition)
                    .map_err(|e| AppError::Serialization(e.to_string()))?;
                print!("{}", yaml);
            }
            PromptsAction::Eject { id, force } => {
                let source = builtin_source(id)
                    .ok_or_else(|| AppError::Prompt(format!("Unknown built-in prompt: {}", id)))?;

                let dir = prompts_dir(&config.workspace);
                let path = dir.join(format!("{}.yml", id));
                if path.exists() && !force {
                    return Err(AppError::Prompt(format!(
                        "{:?} already exists (use --force to overwrite)",
                        path
                    )));
                }

                std::fs::create_dir_all(&dir)?;
                std::fs::write(&path, source)?;
                tracing::info!("Wrote prompt override to {:?}", path);
                println!("{}", path.display());
            }
            PromptsAction::Check => {
                let mut failures = 0;
                for (id, origin) in list_prompts(&config.workspace)? {
                    match load_prompt(&config.workspace, &id) {
                        Ok(_) => println!("ok      {} ({:?})", id, origin),
                        Err(e) => {
                            failures += 1;
                            println!("invalid {} ({:?}): {}", id, origin, e);
                        }
                    }
                }
                if failures > 0 {
                    return Err(AppError::Prompt(format!("{} invalid prompts", failures)));
                }
            }
        }

        Ok(())
    }
}
