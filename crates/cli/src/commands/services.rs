//! Process-wide collaborators, built once and passed down.

use arag_core::config::AppConfig;
use arag_core::AppResult;
use arag_knowledge::rag::{open_sink, open_store};
use arag_knowledge::{
    create_provider, open_index, DocumentRegistry, EmbeddingProvider, RagPipeline, Retriever,
    VectorIndex,
};
use arag_llm::create_client;
use arag_prompt::PromptSet;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Embedding provider and vector index for the configured collection.
pub struct Knowledge {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
}

impl Knowledge {
    pub async fn open(config: &AppConfig) -> AppResult<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let embedder =
            create_provider(&config.embeddings, &config.ollama_base_url, timeout).await?;
        let index = open_index(config, embedder.dimensions()).await?;

        tracing::debug!(
            "Embeddings: {}/{} ({} dims), index: {}",
            embedder.provider_name(),
            embedder.model_name(),
            embedder.dimensions(),
            index.backend_name()
        );

        Ok(Self { embedder, index })
    }
}

pub fn registry(config: &AppConfig) -> DocumentRegistry {
    DocumentRegistry::new(config.documents_path())
}

/// Full query pipeline: model client, prompts, retriever, memory and tracing.
pub async fn pipeline(config: &AppConfig) -> AppResult<RagPipeline> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let llm = create_client(&config.provider, Some(config.ollama_base_url.as_str()), timeout)?;
    let prompts = PromptSet::load(&config.prompts_dir())?;
    let knowledge = Knowledge::open(config).await?;

    let retriever = Retriever::new(knowledge.embedder, knowledge.index);
    let pipeline = RagPipeline::new(llm, prompts, retriever, config.model.clone())
        .with_store(open_store(config).await)
        .with_tracer(open_sink(config), config.tracing.tags.clone());

    Ok(pipeline)
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
