//! Error types for the agentic RAG workspace.
//!
//! One enum covers every failure category the pipeline can surface:
//! configuration, I/O, model and embedding providers, the vector index,
//! prompts, extraction and request validation.

use thiserror::Error;

/// Unified error type.
///
/// Degraded capabilities (unscored search, stateless conversations, a
/// missing trace sink) are never represented here; they take their
/// fallback path and log a warning instead.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Language model provider errors (timeouts, HTTP failures, bad bodies)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index and document registry errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt loading and rendering errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// The extractor has no reader for this file extension.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// A request field is out of its accepted range.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
