//! LLM provider factory.
//!
//! Resolves a provider name to a client. Ollama is the only backend; any
//! other name is a configuration error reported before a request is made.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use arag_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier (only "ollama" is accepted)
/// * `endpoint` - Optional custom endpoint URL
/// * `timeout` - Per-request timeout
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    timeout: Duration,
) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or(DEFAULT_ENDPOINT);
            let client = OllamaClient::new(base_url, timeout)?;
            Ok(Arc::new(client))
        }
        _ => Err(AppError::Config(
            "Only the Ollama provider is supported in this project.".to_string(),
        )),
    }
}
