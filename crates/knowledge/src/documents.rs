//! Registry of ingested documents, kept as `.arag/documents.jsonl`.
//!
//! The registry is what lets a query say `@report.pdf` instead of a doc id.

use crate::types::Metadata;
use arag_core::{AppError, AppResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Per-file ingestion statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    pub file_bytes: u64,
    pub extracted_units: usize,
    pub extracted_chars: usize,
    pub avg_chunk_chars: f64,
}

/// One uploaded and indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedDocument {
    pub doc_id: String,
    pub filename: String,
    pub stored_path: String,
    pub chunks_added: usize,
    pub stats: IngestStats,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Append-only JSONL registry of ingested documents.
pub struct DocumentRegistry {
    path: PathBuf,
}

impl DocumentRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a document record.
    pub fn record(&self, document: &IngestedDocument) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open document registry: {}", e)))?;

        let line = serde_json::to_string(document)?;
        writeln!(file, "{}", line).map_err(|e| {
            AppError::Knowledge(format!("Failed to write document registry: {}", e))
        })?;
        file.sync_all().map_err(|e| {
            AppError::Knowledge(format!("Failed to sync document registry: {}", e))
        })?;

        tracing::debug!("Registered document {} ({})", document.doc_id, document.filename);
        Ok(())
    }

    /// All registered documents in ingestion order.
    pub fn list(&self) -> AppResult<Vec<IngestedDocument>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open document registry: {}", e)))?;

        let mut documents = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let document: IngestedDocument = serde_json::from_str(&line).map_err(|e| {
                AppError::Knowledge(format!(
                    "Failed to parse line {} of {:?}: {}",
                    line_num + 1,
                    self.path,
                    e
                ))
            })?;
            documents.push(document);
        }

        Ok(documents)
    }

    /// Doc id of the most recently ingested document with this file name
    /// (case-insensitive).
    pub fn doc_id_by_name(&self, filename: &str) -> AppResult<Option<String>> {
        let wanted = filename.to_lowercase();
        Ok(self
            .list()?
            .into_iter()
            .rev()
            .find(|doc| doc.filename.to_lowercase() == wanted)
            .map(|doc| doc.doc_id))
    }

    /// Forget every document. Stored uploads are left on disk.
    pub fn clear(&self) -> AppResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                AppError::Knowledge(format!("Failed to delete document registry: {}", e))
            })?;
        }
        Ok(())
    }
}

fn file_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@(\S+)").expect("valid regex"))
}

/// Resolve `@filename` tags in a query.
///
/// Returns the query with every tag removed and whitespace collapsed, plus
/// the doc ids of the tagged files that are registered, first occurrence
/// first. A tag such as `@notes.md?` also matches `notes.md`.
pub fn parse_file_tags(query: &str, registry: &DocumentRegistry) -> AppResult<(String, Vec<String>)> {
    let documents = registry.list()?;
    let lookup = |name: &str| {
        let wanted = name.to_lowercase();
        documents
            .iter()
            .rev()
            .find(|doc| doc.filename.to_lowercase() == wanted)
            .map(|doc| doc.doc_id.clone())
    };

    let mut doc_ids: Vec<String> = Vec::new();
    for caps in file_tag_regex().captures_iter(query) {
        let tag = &caps[1];
        let resolved = lookup(tag).or_else(|| {
            let trimmed = tag.trim_end_matches(|c: char| matches!(c, '?' | '.' | ',' | '!' | ';' | ':'));
            (trimmed != tag && !trimmed.is_empty())
                .then(|| lookup(trimmed))
                .flatten()
        });

        match resolved {
            Some(doc_id) if !doc_ids.contains(&doc_id) => doc_ids.push(doc_id),
            Some(_) => {}
            None => tracing::debug!("No document registered for tag @{}", tag),
        }
    }

    let cleaned = file_tag_regex().replace_all(query, "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    Ok((cleaned, doc_ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(doc_id: &str, filename: &str) -> IngestedDocument {
        IngestedDocument {
            doc_id: doc_id.to_string(),
            filename: filename.to_string(),
            stored_path: format!("uploads/{}__{}", doc_id, filename),
            chunks_added: 3,
            stats: IngestStats::default(),
            metadata: Metadata::new(),
        }
    }

    fn registry_with(temp: &TempDir, docs: &[IngestedDocument]) -> DocumentRegistry {
        let registry = DocumentRegistry::new(temp.path().join("documents.jsonl"));
        for d in docs {
            registry.record(d).unwrap();
        }
        registry
    }

    #[test]
    fn test_record_and_list_in_order() {
        let temp = TempDir::new().unwrap();
        let registry = registry_with(&temp, &[doc("id1", "a.pdf"), doc("id2", "b.md")]);

        let docs = registry.list().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].filename, "a.pdf");
        assert_eq!(docs[1].doc_id, "id2");
    }

    #[test]
    fn test_list_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let registry = DocumentRegistry::new(temp.path().join("none.jsonl"));
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_lookup_is_case_insensitive_latest_wins() {
        let temp = TempDir::new().unwrap();
        let registry = registry_with(&temp, &[doc("old", "Report.PDF"), doc("new", "report.pdf")]);
        assert_eq!(registry.doc_id_by_name("REPORT.pdf").unwrap().as_deref(), Some("new"));
        assert_eq!(registry.doc_id_by_name("other.pdf").unwrap(), None);
    }

    #[test]
    fn test_parse_file_tags() {
        let temp = TempDir::new().unwrap();
        let registry = registry_with(&temp, &[doc("id1", "doc1.pdf"), doc("id2", "notes.md")]);

        let (query, ids) = parse_file_tags("Compare @doc1.pdf and @notes.md", &registry).unwrap();
        assert_eq!(query, "Compare and");
        assert_eq!(ids, vec!["id1", "id2"]);
    }

    #[test]
    fn test_parse_file_tags_unknown_and_duplicates() {
        let temp = TempDir::new().unwrap();
        let registry = registry_with(&temp, &[doc("id1", "doc1.pdf")]);

        let (query, ids) =
            parse_file_tags("  @DOC1.pdf   what about @missing.txt  and @doc1.pdf ", &registry).unwrap();
        assert_eq!(query, "what about and");
        assert_eq!(ids, vec!["id1"]);
    }

    #[test]
    fn test_parse_file_tags_trailing_punctuation() {
        let temp = TempDir::new().unwrap();
        let registry = registry_with(&temp, &[doc("id1", "document1.pdf")]);

        let (query, ids) = parse_file_tags("What is in @document1.pdf?", &registry).unwrap();
        assert_eq!(query, "What is in");
        assert_eq!(ids, vec!["id1"]);
    }

    #[test]
    fn test_clear_removes_registry() {
        let temp = TempDir::new().unwrap();
        let registry = registry_with(&temp, &[doc("id1", "a.txt")]);
        registry.clear().unwrap();
        assert!(registry.list().unwrap().is_empty());
        assert!(!registry.path().exists());
    }
}
