//! Embedding provider trait and factory.

use super::providers::{OllamaProvider, TrigramProvider};
use arag_core::config::EmbeddingSettings;
use arag_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Turns text into fixed-width vectors.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "ollama", "trigram")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Embed many texts, one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Embed a single text (e.g. a query).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Create the configured embedding provider.
///
/// The Ollama provider checks connectivity and vector width before it is
/// handed out, so a misconfigured model fails here rather than mid-ingest.
pub async fn create_provider(
    settings: &EmbeddingSettings,
    base_url: &str,
    timeout: Duration,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.to_lowercase().as_str() {
        "ollama" => {
            let provider = OllamaProvider::new(
                base_url,
                &settings.model,
                settings.dimensions,
                timeout,
            )?;
            provider.verify_connection().await?;
            Ok(Arc::new(provider))
        }

        "trigram" => Ok(Arc::new(TrigramProvider::new(settings.dimensions))),

        other => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: ollama, trigram",
            other
        ))),
    }
}
