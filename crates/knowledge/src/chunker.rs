//! Chunking of extracted units into overlapping, bounded segments.

use crate::types::{Chunk, Metadata, TextUnit};
use arag_core::{AppError, AppResult};
use text_splitter::{ChunkConfig, TextSplitter};

/// Splits the units of one document, numbering chunks across the whole
/// document rather than per unit.
pub struct Chunker {
    doc_id: String,
    splitter: TextSplitter<text_splitter::Characters>,
    next_index: usize,
}

impl Chunker {
    /// `chunk_size` and `overlap` are measured in characters.
    pub fn new(doc_id: impl Into<String>, chunk_size: usize, overlap: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be greater than 0".to_string()));
        }

        let config = ChunkConfig::new(chunk_size)
            .with_overlap(overlap)
            .map_err(|e| AppError::Config(format!("Invalid chunk configuration: {}", e)))?;

        Ok(Self {
            doc_id: doc_id.into(),
            splitter: TextSplitter::new(config),
            next_index: 0,
        })
    }

    /// Number of chunks produced so far.
    pub fn produced(&self) -> usize {
        self.next_index
    }

    /// Split one unit. Every chunk inherits `base_metadata` plus its own
    /// `chunk_index` and `chunk_id`.
    pub fn split(&mut self, unit: &TextUnit, base_metadata: &Metadata) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for piece in self.splitter.chunks(&unit.text) {
            if piece.trim().is_empty() {
                continue;
            }

            let chunk_index = self.next_index;
            self.next_index += 1;

            let chunk_id = Chunk::make_id(&self.doc_id, unit.unit_index, chunk_index);
            let mut metadata = base_metadata.clone();
            metadata.insert("chunk_index".to_string(), chunk_index.into());
            metadata.insert("chunk_id".to_string(), chunk_id.clone().into());

            chunks.push(Chunk {
                chunk_id,
                doc_id: self.doc_id.clone(),
                unit_index: unit.unit_index,
                chunk_index,
                text: piece.to_string(),
                metadata,
            });
        }

        tracing::debug!(
            "Unit {} of {} split into {} chunks",
            unit.unit_index,
            self.doc_id,
            chunks.len()
        );

        chunks
    }
}
