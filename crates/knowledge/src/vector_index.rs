//! Vector index abstraction for document chunks.
//!
//! Backends store chunk text, metadata and embedding keyed by `chunk_id`,
//! and answer top-k nearest-neighbor queries with an optional filter on
//! `doc_id`.

use crate::lancedb_index::LanceDbIndex;
use crate::memory_index::MemoryIndex;
use crate::types::{IndexRecord, RetrievedRow};
use arag_core::{AppConfig, AppError, AppResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Restricts a search to chunks of the listed documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub doc_ids: Vec<String>,
}

impl MetadataFilter {
    /// Filter in the `{"doc_id": {"$in": [...]}}` form recorded in traces.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "doc_id": { "$in": self.doc_ids } })
    }

    /// SQL predicate over the `doc_id` column.
    pub fn to_sql(&self) -> String {
        sql_in_list("doc_id", &self.doc_ids)
    }

    pub fn matches(&self, doc_id: &str) -> bool {
        self.doc_ids.iter().any(|id| id == doc_id)
    }
}

/// Trait for vector index backends.
///
/// Implementations must support:
/// - Upserting records keyed by chunk id
/// - Scored top-k search, and an unscored fallback
/// - Deleting one document, counting and clearing
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Insert or replace records; returns how many were written.
    async fn upsert(&self, records: &[IndexRecord]) -> AppResult<usize>;

    /// Top-k rows by descending similarity, each carrying its score.
    async fn search_scored(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AppResult<Vec<RetrievedRow>>;

    /// Top-k rows without scores.
    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AppResult<Vec<RetrievedRow>>;

    /// Remove every chunk of one document.
    async fn delete_doc(&self, doc_id: &str) -> AppResult<()>;

    /// Number of stored chunks.
    async fn count(&self) -> AppResult<usize>;

    /// Remove every chunk.
    async fn reset(&self) -> AppResult<()>;
}

/// Open the configured index backend for vectors of width `dimensions`.
pub async fn open_index(config: &AppConfig, dimensions: usize) -> AppResult<Arc<dyn VectorIndex>> {
    match config.index.backend.as_str() {
        "lancedb" => {
            let index =
                LanceDbIndex::open(&config.index_dir(), &config.index.collection, dimensions).await?;
            Ok(Arc::new(index))
        }
        "memory" => Ok(Arc::new(MemoryIndex::new(dimensions))),
        other => Err(AppError::Config(format!(
            "Unknown index backend: '{}'. Supported backends: lancedb, memory",
            other
        ))),
    }
}

/// `column IN ('a', 'b')` with single quotes doubled.
pub(crate) fn sql_in_list(column: &str, values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect();
    format!("{} IN ({})", column, quoted.join(", "))
}

/// Cosine similarity; 0.0 for mismatched or zero vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
