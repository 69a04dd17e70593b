//! Eval command handler.

use arag_core::{config::AppConfig, AppResult};
use arag_knowledge::rag::export_eval_rows;
use clap::{Args, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Evaluation dataset tooling
#[derive(Args, Debug)]
pub struct EvalCommand {
    #[command(subcommand)]
    pub action: EvalAction,
}

#[derive(Subcommand, Debug)]
pub enum EvalAction {
    /// Write {user_input, response, retrieved_contexts} rows as JSONL
    Export {
        /// Only traces carrying this tag
        #[arg(long, default_value = "ragas_eval")]
        tag: String,

        /// Newest traces to consider
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl EvalCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            EvalAction::Export { tag, limit, output } => {
                let rows = export_eval_rows(&config.trace_path(), Some(tag.as_str()), Some(*limit))?;

                let mut writer: Box<dyn Write> = match output {
                    Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                    None => Box::new(std::io::stdout().lock()),
                };
                for row in &rows {
                    writeln!(writer, "{}", serde_json::to_string(row)?)?;
                }
                writer.flush()?;

                if let Some(path) = output {
                    eprintln!("Wrote {} rows to {}", rows.len(), path.display());
                }
                Ok(())
            }
        }
    }
}
