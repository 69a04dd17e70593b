//! Data model shared by ingestion and retrieval.

use serde::{Deserialize, Serialize};

/// Free-form chunk metadata as stored in the index.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A page (paginated formats) or a whole document (flat formats).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub unit_index: usize,
    pub text: String,
}

impl TextUnit {
    pub fn new(unit_index: usize, text: impl Into<String>) -> Self {
        Self {
            unit_index,
            text: text.into(),
        }
    }
}

/// A bounded slice of extracted text; the unit of indexing and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{doc_id}:{unit_index}:{chunk_index}`, the index key
    pub chunk_id: String,
    pub doc_id: String,
    pub unit_index: usize,
    /// Counter over the whole document, not reset per unit
    pub chunk_index: usize,
    pub text: String,
    pub metadata: Metadata,
}

impl Chunk {
    /// Build the stable chunk identifier.
    pub fn make_id(doc_id: &str, unit_index: usize, chunk_index: usize) -> String {
        format!("{}:{}:{}", doc_id, unit_index, chunk_index)
    }
}

/// A chunk paired with its embedding, ready for the index.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// One search hit. `score` is `None` when the search path had no distance metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedRow {
    pub chunk_id: String,
    pub score: Option<f32>,
    pub text: String,
    pub metadata: Metadata,
}

/// A retrieved row labeled with its positional citation tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// "S1", "S2", ... in rank order; only meaningful within one turn
    pub source_id: String,
    pub chunk_id: String,
    pub score: Option<f32>,
    pub text: String,
    pub metadata: Metadata,
}

impl Source {
    /// Label rows S1..Sn in the order given.
    pub fn label_all(rows: Vec<RetrievedRow>) -> Vec<Source> {
        rows.into_iter()
            .enumerate()
            .map(|(i, row)| Source {
                source_id: format!("S{}", i + 1),
                chunk_id: row.chunk_id,
                score: row.score,
                text: row.text,
                metadata: row.metadata,
            })
            .collect()
    }

    pub fn citation(&self) -> Citation {
        Citation {
            source_id: self.source_id.clone(),
            chunk_id: self.chunk_id.clone(),
            score: self.score,
            metadata: self.metadata.clone(),
        }
    }
}

/// A source offered to the model, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: String,
    pub chunk_id: String,
    pub score: Option<f32>,
    pub metadata: Metadata,
}

/// Counters for one ingested document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestResult {
    pub doc_id: String,
    pub extracted_units: usize,
    pub extracted_chars: usize,
    pub chunks_added: usize,
    pub avg_chunk_chars: f64,
}
