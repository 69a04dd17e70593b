//! Ingest command handler.

use super::services::{print_json, registry, Knowledge};
use arag_core::{config::AppConfig, AppError, AppResult};
use arag_knowledge::{collect_files, Ingestor, Metadata, UploadSummary};
use clap::Args;
use std::path::PathBuf;

/// Upload and index documents (.pdf, .docx, .txt, .md, .html)
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Index a single file in place under this doc id (no upload copy)
    #[arg(long)]
    pub doc_id: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let knowledge = Knowledge::open(config).await?;
        let ingestor = Ingestor::new(knowledge.embedder, knowledge.index, config.ingest.clone());

        if let Some(doc_id) = &self.doc_id {
            return self.ingest_in_place(&ingestor, doc_id).await;
        }

        let files = collect_files(&self.files);
        tracing::info!("Ingesting {} files", files.len());

        let summary = ingestor
            .upload(
                &files,
                &config.uploads_dir(),
                &registry(config),
                &config.index.collection,
            )
            .await?;

        if self.json {
            print_json(&summary)?;
        } else {
            print_summary(&summary);
        }

        if summary.documents_ingested == 0 && !summary.failures.is_empty() {
            return Err(AppError::Knowledge("No documents were ingested".to_string()));
        }
        Ok(())
    }

    async fn ingest_in_place(&self, ingestor: &Ingestor, doc_id: &str) -> AppResult<()> {
        let [path] = self.files.as_slice() else {
            return Err(AppError::InvalidRequest(
                "--doc-id requires exactly one file".to_string(),
            ));
        };

        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let result = ingestor
            .ingest_file(path, &source_name, Some(doc_id.to_string()), Metadata::new())
            .await?;

        if self.json {
            print_json(&result)?;
        } else {
            println!(
                "Indexed {} as {}: {} units, {} chars, {} chunks (avg {:.0} chars)",
                source_name,
                result.doc_id,
                result.extracted_units,
                result.extracted_chars,
                result.chunks_added,
                result.avg_chunk_chars
            );
        }
        Ok(())
    }
}

fn print_summary(summary: &UploadSummary) {
    for doc in &summary.documents {
        println!(
            "✓ {} -> {} ({} chunks, {} bytes)",
            doc.filename, doc.doc_id, doc.chunks_added, doc.stats.file_bytes
        );
    }
    for failure in &summary.failures {
        println!("✗ {}: {}", failure.filename, failure.error);
    }
    println!(
        "Ingested {}/{} files: {} chunks from {} chars (chunk size {}, overlap {})",
        summary.documents_ingested,
        summary.files_received,
        summary.total_chunks_added,
        summary.total_extracted_chars,
        summary.chunk_size,
        summary.chunk_overlap
    );
}
