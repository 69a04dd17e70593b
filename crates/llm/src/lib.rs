//! Language model integration.
//!
//! A provider-agnostic chat abstraction (`LlmClient`) plus the Ollama
//! implementation the pipeline runs against.
//!
//! # Example
//! ```no_run
//! use arag_llm::{ChatMessage, LlmClient, LlmRequest, OllamaClient};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new("http://localhost:11434", Duration::from_secs(60))?;
//! let request = LlmRequest::new(vec![ChatMessage::user("Hello!")], "gemma3:4b");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::OllamaClient;
pub use types::{ChatMessage, Role};
