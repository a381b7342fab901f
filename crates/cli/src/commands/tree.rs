//! Tree command handler.

use super::{build_orchestrator, cancel_on_ctrl_c, print_json, TreeLimits};
use clap::Args;
use frag_core::{config::AppConfig, AppResult};

/// Expand a question into its aspect tree
#[derive(Args, Debug)]
pub struct TreeCommand {
    /// The question to expand
    pub question: String,

    /// Print root-to-leaf question paths instead of the outline
    #[arg(long)]
    pub paths: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub limits: TreeLimits,
}

impl TreeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing tree command");

        let orchestrator = build_orchestrator(config, &self.limits)?;
        let expansion = orchestrator
            .build_tree(&self.question, &cancel_on_ctrl_c())
            .await?;
        let tree = &expansion.tree;

        match (self.json, self.paths) {
            (true, true) => print_json(&tree.leaf_paths())?,
            (true, false) => print_json(&serde_json::json!({
                "tree": tree,
                "report": expansion.report,
                "cancelled": expansion.cancelled,
            }))?,
            (false, true) => {
                for path in tree.leaf_paths() {
                    println!("{}", path.join(" > "));
                }
            }
            (false, false) => {
                print!("{}", tree.render());
                for warning in &expansion.report.warnings {
                    tracing::debug!(
                        "Discarded under node {} ({:?}): {}",
                        warning.node,
                        warning.reason,
                        warning.aspect
                    );
                }
            }
        }

        if expansion.report.is_degraded() {
            tracing::warn!(
                "{} nodes could not be expanded",
                expansion.report.entries.len()
            );
        }

        Ok(())
    }
}
