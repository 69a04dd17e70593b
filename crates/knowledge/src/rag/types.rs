//! Request and response shapes of the query pipeline.

use crate::types::{Citation, Metadata, RetrievedRow};
use arag_core::config::{QuerySettings, SUPPORTED_LLM_PROVIDER};
use arag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_K: usize = 1;
pub const MAX_K: usize = 50;
pub const MIN_CONTEXT_CHARS: usize = 1000;
pub const MAX_CONTEXT_CHARS: usize = 80000;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Whether a query needs document retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Direct,
    Retrieve,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Retrieve => "retrieve",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_k() -> usize {
    QuerySettings::default().k
}

fn default_max_context_chars() -> usize {
    QuerySettings::default().max_context_chars
}

fn default_provider() -> String {
    SUPPORTED_LLM_PROVIDER.to_string()
}

/// A question for the classic retrieve-then-answer path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub doc_ids: Option<Vec<String>>,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Overrides the configured chat model
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: f32,
}

impl AskRequest {
    /// A request for `query` with the configured query defaults.
    pub fn new(query: impl Into<String>, defaults: &QuerySettings) -> Self {
        Self {
            query: query.into(),
            k: defaults.k,
            doc_ids: None,
            max_context_chars: defaults.max_context_chars,
            provider: default_provider(),
            model: None,
            temperature: defaults.temperature,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        validate_query(&self.query)?;
        validate_k(self.k)?;

        if !(MIN_CONTEXT_CHARS..=MAX_CONTEXT_CHARS).contains(&self.max_context_chars) {
            return Err(AppError::InvalidRequest(format!(
                "max_context_chars must be between {} and {}, got {}",
                MIN_CONTEXT_CHARS, MAX_CONTEXT_CHARS, self.max_context_chars
            )));
        }

        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(AppError::InvalidRequest(format!(
                "temperature must be between 0.0 and {}, got {}",
                MAX_TEMPERATURE, self.temperature
            )));
        }

        if !self.provider.eq_ignore_ascii_case(SUPPORTED_LLM_PROVIDER) {
            return Err(AppError::Config(
                "Only the Ollama provider is supported in this project.".to_string(),
            ));
        }

        Ok(())
    }
}

/// A routed, optionally stateful question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgenticAskRequest {
    #[serde(flatten)]
    pub ask: AskRequest,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AgenticAskRequest {
    pub fn validate(&self) -> AppResult<()> {
        self.ask.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub query: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub used_k: usize,
    pub applied_filter: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgenticAskResponse {
    pub answer: String,
    pub route: Route,
    pub citations: Vec<Citation>,
    /// Present only when the turn was persisted under a session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub memory_enabled: bool,
}

/// Raw nearest-neighbor lookup with no generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub doc_ids: Option<Vec<String>>,
}

impl RetrieveRequest {
    pub fn validate(&self) -> AppResult<()> {
        validate_query(&self.query)?;
        validate_k(self.k)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedResult {
    pub id: String,
    pub score: Option<f32>,
    pub text: String,
    pub metadata: Metadata,
}

impl From<RetrievedRow> for RetrievedResult {
    fn from(row: RetrievedRow) -> Self {
        Self {
            id: row.chunk_id,
            score: row.score,
            text: row.text,
            metadata: row.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub query: String,
    pub k: usize,
    pub applied_filter: Option<serde_json::Value>,
    pub results: Vec<RetrievedResult>,
}

fn validate_query(query: &str) -> AppResult<()> {
    if query.trim().is_empty() {
        return Err(AppError::InvalidRequest("query must not be empty".to_string()));
    }
    Ok(())
}

fn validate_k(k: usize) -> AppResult<()> {
    if !(MIN_K..=MAX_K).contains(&k) {
        return Err(AppError::InvalidRequest(format!(
            "k must be between {} and {}, got {}",
            MIN_K, MAX_K, k
        )));
    }
    Ok(())
}
