//! Embedding providers.
//!
//! Ingestion and retrieval must embed with the same provider and model;
//! the index does not record which one produced its vectors.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
