//! Query-time retrieval with a scored-then-unscored fallback.

use crate::embeddings::EmbeddingProvider;
use crate::types::RetrievedRow;
use crate::vector_index::{MetadataFilter, VectorIndex};
use arag_core::AppResult;
use std::sync::Arc;

/// No filter for `None` or an empty list, else membership on `doc_id`.
pub fn build_metadata_filter(doc_ids: Option<&[String]>) -> Option<MetadataFilter> {
    match doc_ids {
        Some(ids) if !ids.is_empty() => Some(MetadataFilter {
            doc_ids: ids.to_vec(),
        }),
        _ => None,
    }
}

/// Rows plus the filter that was actually applied.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub rows: Vec<RetrievedRow>,
    pub applied_filter: Option<MetadataFilter>,
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Top-`k` rows for `query`, best first.
    ///
    /// A failing scored search is not an error: the unscored path runs
    /// instead and every row comes back with `score: None`. Embedding
    /// failures propagate.
    #[tracing::instrument(skip(self, query, doc_ids))]
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        doc_ids: Option<&[String]>,
    ) -> AppResult<Retrieval> {
        let applied_filter = build_metadata_filter(doc_ids);
        let query_embedding = self.embedder.embed(query).await?;

        let mut rows = match self
            .index
            .search_scored(&query_embedding, k, applied_filter.as_ref())
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Scored search failed, falling back to unscored search: {}", e);
                self.index
                    .search(&query_embedding, k, applied_filter.as_ref())
                    .await?
                    .into_iter()
                    .map(|row| RetrievedRow { score: None, ..row })
                    .collect()
            }
        };
        rows.truncate(k);

        tracing::debug!("Retrieved {} rows from {}", rows.len(), self.index.backend_name());

        Ok(Retrieval {
            rows,
            applied_filter,
        })
    }
}
