//! Documents command handler.

use super::services::{print_json, registry, Knowledge};
use arag_core::{config::AppConfig, AppResult};
use clap::{Args, Subcommand};

/// List or clear ingested documents
#[derive(Args, Debug)]
pub struct DocumentsCommand {
    #[command(subcommand)]
    pub action: DocumentsAction,
}

#[derive(Subcommand, Debug)]
pub enum DocumentsAction {
    /// List ingested documents
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget every document and empty the index
    Clear,
}

impl DocumentsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let registry = registry(config);

        match &self.action {
            DocumentsAction::List { json } => {
                let documents = registry.list()?;
                if *json {
                    return print_json(&documents);
                }
                if documents.is_empty() {
                    println!("No documents ingested yet. Run 'arag ingest <files>' first.");
                    return Ok(());
                }
                for doc in &documents {
                    println!(
                        "{}  {}  {} chunks  {} bytes",
                        doc.doc_id, doc.filename, doc.chunks_added, doc.stats.file_bytes
                    );
                }
                Ok(())
            }
            DocumentsAction::Clear => {
                let knowledge = Knowledge::open(config).await?;
                knowledge.index.reset().await?;
                registry.clear()?;
                tracing::info!("Cleared document registry and index");
                println!("All documents cleared");
                Ok(())
            }
        }
    }
}
