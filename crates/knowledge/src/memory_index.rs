//! In-process vector index. Nothing survives the process; used by tests
//! and by the `memory` backend for throwaway sessions.

use crate::types::{IndexRecord, RetrievedRow};
use crate::vector_index::{cosine_similarity, MetadataFilter, VectorIndex};
use arag_core::{AppError, AppResult};
use async_trait::async_trait;
use tokio::sync::RwLock;

pub struct MemoryIndex {
    dimensions: usize,
    records: RwLock<Vec<IndexRecord>>,
}

impl MemoryIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            records: RwLock::new(Vec::new()),
        }
    }

    async fn ranked(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AppResult<Vec<(f32, RetrievedRow)>> {
        if query_embedding.len() != self.dimensions {
            return Err(AppError::Knowledge(format!(
                "Query embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                query_embedding.len()
            )));
        }

        let records = self.records.read().await;
        let mut scored: Vec<(f32, RetrievedRow)> = records
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.chunk.doc_id)))
            .map(|r| {
                (
                    cosine_similarity(query_embedding, &r.embedding),
                    RetrievedRow {
                        chunk_id: r.chunk.chunk_id.clone(),
                        score: None,
                        text: r.chunk.text.clone(),
                        metadata: r.chunk.metadata.clone(),
                    },
                )
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, records: &[IndexRecord]) -> AppResult<usize> {
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != self.dimensions) {
            return Err(AppError::Knowledge(format!(
                "Embedding dimension mismatch for {}: expected {}, got {}",
                bad.chunk.chunk_id,
                self.dimensions,
                bad.embedding.len()
            )));
        }

        let mut stored = self.records.write().await;
        for record in records {
            match stored
                .iter_mut()
                .find(|r| r.chunk.chunk_id == record.chunk.chunk_id)
            {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(records.len())
    }

    async fn search_scored(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AppResult<Vec<RetrievedRow>> {
        Ok(self
            .ranked(query_embedding, k, filter)
            .await?
            .into_iter()
            .map(|(score, row)| RetrievedRow {
                score: Some(score),
                ..row
            })
            .collect())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> AppResult<Vec<RetrievedRow>> {
        Ok(self
            .ranked(query_embedding, k, filter)
            .await?
            .into_iter()
            .map(|(_, row)| row)
            .collect())
    }

    async fn delete_doc(&self, doc_id: &str) -> AppResult<()> {
        self.records.write().await.retain(|r| r.chunk.doc_id != doc_id);
        Ok(())
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.records.read().await.len())
    }

    async fn reset(&self) -> AppResult<()> {
        self.records.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, Metadata};

    fn record(doc_id: &str, idx: usize, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord {
            chunk: Chunk {
                chunk_id: Chunk::make_id(doc_id, 0, idx),
                doc_id: doc_id.to_string(),
                unit_index: 0,
                chunk_index: idx,
                text: format!("{} #{}", doc_id, idx),
                metadata: Metadata::new(),
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn test_ranked_by_similarity() {
        let index = MemoryIndex::new(2);
        index
            .upsert(&[
                record("a", 0, vec![0.0, 1.0]),
                record("a", 1, vec![1.0, 0.0]),
                record("b", 2, vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let rows = index.search_scored(&[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(rows[0].chunk_id, "a:0:1");
        assert_eq!(rows[1].chunk_id, "b:0:2");
        assert!(rows[0].score.unwrap() > rows[1].score.unwrap());
    }

    #[tokio::test]
    async fn test_filter_restricts_documents() {
        let index = MemoryIndex::new(2);
        index
            .upsert(&[record("a", 0, vec![1.0, 0.0]), record("b", 1, vec![0.0, 1.0])])
            .await
            .unwrap();

        let filter = MetadataFilter {
            doc_ids: vec!["b".to_string()],
        };
        let rows = index.search(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].chunk_id, "b:0:1");
        assert_eq!(rows[0].score, None);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_reset_clears() {
        let index = MemoryIndex::new(2);
        index.upsert(&[record("a", 0, vec![1.0, 0.0])]).await.unwrap();
        index.upsert(&[record("a", 0, vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);

        index.reset().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_doc_removes_only_that_document() {
        let index = MemoryIndex::new(2);
        index
            .upsert(&[
                record("a", 0, vec![1.0, 0.0]),
                record("a", 1, vec![0.0, 1.0]),
                record("b", 0, vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        index.delete_doc("a").await.unwrap();
        let rows = index.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].chunk_id, "b:0:0");
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let index = MemoryIndex::new(3);
        assert!(index.upsert(&[record("a", 0, vec![1.0])]).await.is_err());
        assert!(index.search(&[1.0], 1, None).await.is_err());
    }
}
