//! Query trace records for offline evaluation.
//!
//! Every answered query can be written as one JSON line holding the user
//! input, the final answer and the contexts offered to the model. The
//! `eval` module reads these lines back.

use super::types::Route;
use crate::types::Source;
use arag_core::config::AppConfig;
use arag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const RESPONSE_LIMIT: usize = 4000;
pub const CONTEXT_LIMIT: usize = 2000;

/// Which query path produced a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// Classic retrieve-then-answer
    Rag,
    /// Routed, optionally stateful
    Agentic,
}

impl TraceKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rag => "rag_query",
            Self::Agentic => "agentic_rag_query",
        }
    }

    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            Self::Rag => &["rag", "ask", "ragas_eval"],
            Self::Agentic => &["agentic_rag", "ragas_eval"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceInput {
    pub user_input: String,
    pub k: usize,
    pub doc_ids: Option<Vec<String>>,
    pub applied_filter: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceOutput {
    pub response: String,
    pub retrieved_contexts: Vec<String>,
    pub retrieved_chunk_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_enabled: Option<bool>,
}

impl TraceOutput {
    /// Output section for `answer` given the sources that were offered.
    pub fn new(answer: &str, sources: &[Source]) -> Self {
        Self {
            response: truncate_text(answer, RESPONSE_LIMIT),
            retrieved_contexts: sources
                .iter()
                .map(|s| truncate_text(&s.text, CONTEXT_LIMIT))
                .collect(),
            retrieved_chunk_ids: sources.iter().map(|s| s.chunk_id.clone()).collect(),
            route: None,
            memory_enabled: None,
        }
    }

    pub fn with_route(mut self, route: Route, memory_enabled: bool) -> Self {
        self.route = Some(route);
        self.memory_enabled = Some(memory_enabled);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub input: TraceInput,
    pub output: TraceOutput,
}

impl TraceRecord {
    /// A fresh record. `extra_tags` follow the kind's own tags.
    pub fn new(kind: TraceKind, extra_tags: &[String], input: TraceInput, output: TraceOutput) -> Self {
        let mut tags: Vec<String> = kind.tags().iter().map(|t| t.to_string()).collect();
        for tag in extra_tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        Self {
            trace_id: format!("req_{}", uuid::Uuid::new_v4().simple()),
            name: kind.name().to_string(),
            tags,
            timestamp: chrono::Utc::now(),
            input,
            output,
        }
    }
}

/// First `limit` characters of `text`, with `...` appended when cut.
pub fn truncate_text(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

pub trait TraceSink: Send + Sync {
    fn record(&self, record: &TraceRecord) -> AppResult<()>;
}

/// Open the configured sink, or `None` when tracing is off.
pub fn open_sink(config: &AppConfig) -> Option<Arc<dyn TraceSink>> {
    if !config.tracing.enabled {
        tracing::debug!("Query tracing disabled");
        return None;
    }
    Some(Arc::new(JsonlTraceSink::new(config.trace_path())))
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonlTraceSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTraceSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, record: &TraceRecord) -> AppResult<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::Other("Trace lock poisoned".to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::Other(format!("Failed to open trace log: {}", e)))?;
        writeln!(file, "{}", line)
            .map_err(|e| AppError::Other(format!("Failed to write trace: {}", e)))?;

        tracing::debug!("Recorded trace {}", record.trace_id);
        Ok(())
    }
}
