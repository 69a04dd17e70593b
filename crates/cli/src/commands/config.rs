//! Config command handler.

use arag_core::{config::AppConfig, AppResult};
use arag_prompt::list_prompts;
use clap::{Args, Subcommand};

/// Inspect the effective configuration
#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the merged configuration as YAML
    Show,
    /// List prompt ids (built-in plus .arag/prompts overrides)
    Prompts,
}

impl ConfigCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match self.action {
            ConfigAction::Show => {
                print!("{}", serde_yaml::to_string(config)?);
                println!("# state dir: {}", config.state_dir().display());
                Ok(())
            }
            ConfigAction::Prompts => {
                let prompts_dir = config.prompts_dir();
                for id in list_prompts(&prompts_dir)? {
                    let overridden = prompts_dir.join(format!("{}.yml", id)).exists();
                    println!("{}{}", id, if overridden { "  (workspace override)" } else { "" });
                }
                Ok(())
            }
        }
    }
}
