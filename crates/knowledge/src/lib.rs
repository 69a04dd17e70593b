//! Document ingestion and retrieval-augmented answering.
//!
//! Ingestion runs extractor, chunker and indexer over uploaded files and
//! writes chunk embeddings into a vector index. Query time lives in
//! [`rag`]: a router decides whether a question needs documents, the
//! retriever fetches ranked chunks, and the answerer replies from a
//! bounded, labeled context.

pub mod chunker;
pub mod documents;
pub mod embeddings;
pub mod extract;
pub mod indexer;
pub mod ingest;
pub mod lancedb_index;
pub mod memory_index;
pub mod rag;
pub mod retrieval;
pub mod types;
pub mod vector_index;

// Re-export commonly used types
pub use chunker::Chunker;
pub use documents::{parse_file_tags, DocumentRegistry, IngestStats, IngestedDocument};
pub use embeddings::{create_provider, EmbeddingProvider};
pub use extract::{extract_text_units, DocumentKind};
pub use indexer::Indexer;
pub use ingest::{collect_files, Ingestor, UploadFailure, UploadSummary};
pub use rag::RagPipeline;
pub use retrieval::{build_metadata_filter, Retrieval, Retriever};
pub use types::{Chunk, Citation, IndexRecord, IngestResult, Metadata, RetrievedRow, Source, TextUnit};
pub use vector_index::{open_index, MetadataFilter, VectorIndex};
