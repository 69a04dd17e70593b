//! Ingestion: extract, chunk, embed, index.

use crate::chunker::Chunker;
use crate::documents::{DocumentRegistry, IngestStats, IngestedDocument};
use crate::embeddings::EmbeddingProvider;
use crate::extract::{extract_text_units, file_extension, DocumentKind};
use crate::indexer::Indexer;
use crate::types::{IngestResult, Metadata};
use crate::vector_index::VectorIndex;
use arag_core::config::IngestSettings;
use arag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// A file that could not be uploaded, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadFailure {
    pub filename: String,
    pub error: String,
}

/// Totals for one batch upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub files_received: usize,
    pub documents_ingested: usize,
    pub total_file_bytes: u64,
    pub total_extracted_chars: usize,
    pub total_chunks_added: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub documents: Vec<IngestedDocument>,
    pub failures: Vec<UploadFailure>,
}

/// Runs the ingestion path against one embedding provider and index.
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            settings,
        }
    }

    /// Ingest one file already on disk.
    ///
    /// `doc_id` defaults to a fresh UUID. A supplied `doc_id` replaces that
    /// document: its previous chunks are dropped once extraction succeeds.
    /// `extra` is merged into every chunk's metadata before the standard
    /// keys, which take precedence.
    pub async fn ingest_file(
        &self,
        path: &Path,
        source_name: &str,
        doc_id: Option<String>,
        extra: Metadata,
    ) -> AppResult<IngestResult> {
        let replace_existing = doc_id.is_some();
        let doc_id = doc_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let uploaded_at = chrono::Utc::now().to_rfc3339();

        let owned_path = path.to_path_buf();
        let units = tokio::task::spawn_blocking(move || extract_text_units(&owned_path))
            .await
            .map_err(|e| AppError::Other(format!("Extraction task failed: {}", e)))??;

        if replace_existing {
            self.index.delete_doc(&doc_id).await?;
        }

        let mut chunker = Chunker::new(
            doc_id.clone(),
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        )?;
        let mut indexer = Indexer::new(
            self.embedder.clone(),
            self.index.clone(),
            self.settings.batch_size,
        )?;

        let file_ext = file_extension(path);
        let mut result = IngestResult {
            doc_id: doc_id.clone(),
            ..Default::default()
        };

        for mut unit in units {
            let text = unit.text.trim();
            if text.is_empty() {
                continue;
            }
            unit.text = text.to_string();

            result.extracted_units += 1;
            result.extracted_chars += unit.text.chars().count();

            let mut base = extra.clone();
            base.insert("doc_id".to_string(), doc_id.clone().into());
            base.insert("source_name".to_string(), source_name.into());
            base.insert("unit_index".to_string(), unit.unit_index.into());
            base.insert("uploaded_at".to_string(), uploaded_at.clone().into());
            base.insert("file_ext".to_string(), file_ext.clone().into());

            indexer.add(chunker.split(&unit, &base)).await?;
        }

        let (chunks_added, avg_chunk_chars) = indexer.finish().await?;
        result.chunks_added = chunks_added;
        result.avg_chunk_chars = avg_chunk_chars;

        tracing::info!(
            "Ingested {} as {}: {} units, {} chunks",
            source_name,
            doc_id,
            result.extracted_units,
            result.chunks_added
        );

        Ok(result)
    }

    /// Copy files into `uploads_dir`, ingest each and record it in the registry.
    ///
    /// A failing file is reported in `failures` and does not stop the batch.
    pub async fn upload(
        &self,
        files: &[PathBuf],
        uploads_dir: &Path,
        registry: &DocumentRegistry,
        collection: &str,
    ) -> AppResult<UploadSummary> {
        std::fs::create_dir_all(uploads_dir)?;

        let mut summary = UploadSummary {
            files_received: files.len(),
            documents_ingested: 0,
            total_file_bytes: 0,
            total_extracted_chars: 0,
            total_chunks_added: 0,
            chunk_size: self.settings.chunk_size,
            chunk_overlap: self.settings.chunk_overlap,
            documents: Vec::new(),
            failures: Vec::new(),
        };

        for file in files {
            let filename = safe_name(file);
            match self.upload_one(file, &filename, uploads_dir, collection).await {
                Ok(document) => {
                    registry.record(&document)?;
                    summary.total_file_bytes += document.stats.file_bytes;
                    summary.total_extracted_chars += document.stats.extracted_chars;
                    summary.total_chunks_added += document.chunks_added;
                    summary.documents.push(document);
                }
                Err(e) => {
                    tracing::warn!("Failed to ingest {}: {}", filename, e);
                    summary.failures.push(UploadFailure {
                        filename,
                        error: e.to_string(),
                    });
                }
            }
        }

        summary.documents_ingested = summary.documents.len();
        Ok(summary)
    }

    async fn upload_one(
        &self,
        file: &Path,
        filename: &str,
        uploads_dir: &Path,
        collection: &str,
    ) -> AppResult<IngestedDocument> {
        // Reject before copying anything
        DocumentKind::from_path(file)?;

        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", file, e)))?;
        let sha256 = format!("{:x}", Sha256::digest(&bytes));

        let doc_id = uuid::Uuid::new_v4().to_string();
        let stored_path = uploads_dir.join(format!("{}__{}", doc_id, filename));
        tokio::fs::write(&stored_path, &bytes).await?;

        let result = self
            .ingest_file(&stored_path, filename, Some(doc_id), Metadata::new())
            .await?;

        let mut metadata = Metadata::new();
        metadata.insert("collection".to_string(), collection.into());
        metadata.insert("sha256".to_string(), sha256.into());

        Ok(IngestedDocument {
            doc_id: result.doc_id,
            filename: filename.to_string(),
            stored_path: stored_path.display().to_string(),
            chunks_added: result.chunks_added,
            stats: IngestStats {
                file_bytes: bytes.len() as u64,
                extracted_units: result.extracted_units,
                extracted_chars: result.extracted_chars,
                avg_chunk_chars: result.avg_chunk_chars,
            },
            metadata,
        })
    }
}

/// Expand `paths` into the files to upload.
///
/// Files are taken as given, so an unsupported file still shows up as a
/// failure. Directories are walked recursively and contribute only files
/// with a supported extension, in sorted order.
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| DocumentKind::from_path(p).is_ok())
                .collect();
            found.sort();
            tracing::debug!("Found {} supported files under {:?}", found.len(), path);
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
}

/// File name of `path` with separators and control characters replaced by `_`.
pub fn safe_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    name.chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::TrigramProvider;
    use crate::memory_index::MemoryIndex;
    use tempfile::TempDir;

    fn ingestor(index: Arc<MemoryIndex>, chunk_size: usize, overlap: usize) -> Ingestor {
        Ingestor::new(
            Arc::new(TrigramProvider::new(32)),
            index,
            IngestSettings {
                chunk_size,
                chunk_overlap: overlap,
                batch_size: 3,
            },
        )
    }

    #[tokio::test]
    async fn test_ingest_text_file_counters_and_metadata() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.TXT");
        std::fs::write(&path, format!("  {}  ", "Rust is a language. ".repeat(30))).unwrap();

        let index = Arc::new(MemoryIndex::new(32));
        let mut extra = Metadata::new();
        extra.insert("team".to_string(), "docs".into());

        let result = ingestor(index.clone(), 100, 20)
            .ingest_file(&path, "notes.TXT", Some("doc-1".to_string()), extra)
            .await
            .unwrap();

        assert_eq!(result.doc_id, "doc-1");
        assert_eq!(result.extracted_units, 1);
        assert_eq!(result.extracted_chars, "Rust is a language. ".repeat(30).trim().len());
        assert!(result.chunks_added > 1);
        assert!(result.avg_chunk_chars > 0.0 && result.avg_chunk_chars <= 100.0);
        assert_eq!(index.count().await.unwrap(), result.chunks_added);

        let rows = index
            .search(&TrigramProvider::new(32).embed("Rust").await.unwrap(), 100, None)
            .await
            .unwrap();
        let first = rows.iter().find(|r| r.chunk_id == "doc-1:0:0").unwrap();
        assert_eq!(first.metadata["file_ext"], ".txt");
        assert_eq!(first.metadata["source_name"], "notes.TXT");
        assert_eq!(first.metadata["team"], "docs");
        assert_eq!(first.metadata["chunk_index"], 0);
        assert!(first.metadata.contains_key("uploaded_at"));
    }

    #[tokio::test]
    async fn test_reingest_same_doc_id_drops_old_chunks() {
        let temp = TempDir::new().unwrap();
        let long = temp.path().join("long.txt");
        let short = temp.path().join("short.txt");
        std::fs::write(&long, "Old obsolete content about pricing. ".repeat(30)).unwrap();
        std::fs::write(&short, "New short text.").unwrap();

        let index = Arc::new(MemoryIndex::new(32));
        let ingestor = ingestor(index.clone(), 100, 20);

        let first = ingestor
            .ingest_file(&long, "pricing.txt", Some("d".to_string()), Metadata::new())
            .await
            .unwrap();
        assert!(first.chunks_added > 1);

        let second = ingestor
            .ingest_file(&short, "pricing.txt", Some("d".to_string()), Metadata::new())
            .await
            .unwrap();
        assert_eq!(second.chunks_added, 1);
        assert_eq!(index.count().await.unwrap(), second.chunks_added);

        let filter = crate::vector_index::MetadataFilter {
            doc_ids: vec!["d".to_string()],
        };
        let query = TrigramProvider::new(32).embed("obsolete pricing").await.unwrap();
        let rows = index.search(&query, 5, Some(&filter)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "New short text.");
    }

    #[tokio::test]
    async fn test_ingest_empty_file_adds_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blank.md");
        std::fs::write(&path, "   \n\n  ").unwrap();

        let result = ingestor(Arc::new(MemoryIndex::new(32)), 1200, 200)
            .ingest_file(&path, "blank.md", None, Metadata::new())
            .await
            .unwrap();

        assert_eq!(result.extracted_units, 0);
        assert_eq!(result.chunks_added, 0);
        assert_eq!(result.avg_chunk_chars, 0.0);
        assert!(!result.doc_id.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_unsupported_type() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sheet.xlsx");
        std::fs::write(&path, "x").unwrap();

        let err = ingestor(Arc::new(MemoryIndex::new(32)), 1200, 200)
            .ingest_file(&path, "sheet.xlsx", None, Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFileType(ext) if ext == ".xlsx"));
    }

    #[tokio::test]
    async fn test_upload_isolates_failures() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("guide.md");
        let bad = temp.path().join("data.xlsx");
        std::fs::write(&good, "# Guide\n\nInstall the tool, then run it.").unwrap();
        std::fs::write(&bad, "binary").unwrap();

        let uploads = temp.path().join("uploads");
        let registry = DocumentRegistry::new(temp.path().join("documents.jsonl"));
        let summary = ingestor(Arc::new(MemoryIndex::new(32)), 1200, 200)
            .upload(&[good.clone(), bad], &uploads, &registry, "agentic_rag")
            .await
            .unwrap();

        assert_eq!(summary.files_received, 2);
        assert_eq!(summary.documents_ingested, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].filename, "data.xlsx");
        assert_eq!(summary.chunk_size, 1200);

        let doc = &summary.documents[0];
        assert_eq!(doc.filename, "guide.md");
        assert!(doc
            .stored_path
            .ends_with(&format!("{}__guide.md", doc.doc_id)));
        assert!(Path::new(&doc.stored_path).exists());
        assert_eq!(doc.stats.file_bytes, std::fs::metadata(&good).unwrap().len());
        assert_eq!(doc.metadata["collection"], "agentic_rag");
        assert_eq!(summary.total_chunks_added, doc.chunks_added);

        let listed = registry.list().unwrap();
        assert_eq!(listed, summary.documents);
        assert_eq!(std::fs::read_dir(&uploads).unwrap().count(), 1);
    }

    #[test]
    fn test_collect_files_walks_directories() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        std::fs::create_dir_all(docs.join("sub")).unwrap();
        std::fs::write(docs.join("b.md"), "b").unwrap();
        std::fs::write(docs.join("sub").join("a.PDF"), "a").unwrap();
        std::fs::write(docs.join("skip.xlsx"), "x").unwrap();
        let loose = temp.path().join("loose.xlsx");
        std::fs::write(&loose, "x").unwrap();

        let files = collect_files(&[docs.clone(), loose.clone()]);
        assert_eq!(
            files,
            vec![docs.join("b.md"), docs.join("sub").join("a.PDF"), loose]
        );
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name(Path::new("/tmp/dir/report.pdf")), "report.pdf");
        assert_eq!(safe_name(Path::new("we\tird.txt")), "we_ird.txt");
    }
}
