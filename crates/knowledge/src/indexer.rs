//! Batched embed-and-write of chunks.

use crate::embeddings::EmbeddingProvider;
use crate::types::{Chunk, IndexRecord};
use crate::vector_index::VectorIndex;
use arag_core::{AppError, AppResult};
use std::sync::Arc;

/// Buffers chunks and flushes them to the index every `batch_size` chunks.
///
/// A flushed batch stays indexed even if a later batch fails; ingestion of
/// one document is not transactional.
pub struct Indexer {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    buffer: Vec<Chunk>,
    chunks_added: usize,
    total_chunk_chars: usize,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        batch_size: usize,
    ) -> AppResult<Self> {
        if batch_size == 0 {
            return Err(AppError::Config("batch_size must be greater than 0".to_string()));
        }

        Ok(Self {
            embedder,
            index,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            chunks_added: 0,
            total_chunk_chars: 0,
        })
    }

    /// Queue chunks, flushing whenever the buffer fills.
    pub async fn add(&mut self, chunks: Vec<Chunk>) -> AppResult<()> {
        for chunk in chunks {
            self.total_chunk_chars += chunk.text.chars().count();
            self.buffer.push(chunk);

            if self.buffer.len() >= self.batch_size {
                self.flush().await?;
            }
        }
        Ok(())
    }

    /// Embed and write whatever is buffered.
    pub async fn flush(&mut self) -> AppResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.buffer);
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        if embeddings.len() != batch.len() {
            return Err(AppError::Embedding(format!(
                "Provider returned {} embeddings for {} chunks",
                embeddings.len(),
                batch.len()
            )));
        }

        let records: Vec<IndexRecord> = batch
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexRecord { chunk, embedding })
            .collect();

        let written = self.index.upsert(&records).await?;
        self.chunks_added += written;

        tracing::debug!("Flushed {} chunks ({} total)", written, self.chunks_added);
        Ok(())
    }

    /// Flush the final partial batch and return `(chunks_added, mean chunk length)`.
    pub async fn finish(mut self) -> AppResult<(usize, f64)> {
        self.flush().await?;

        let avg = if self.chunks_added > 0 {
            self.total_chunk_chars as f64 / self.chunks_added as f64
        } else {
            0.0
        };
        Ok((self.chunks_added, avg))
    }
}
