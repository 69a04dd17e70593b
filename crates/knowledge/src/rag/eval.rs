//! Evaluation rows exported from the trace log.

use arag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One question/answer/contexts triple for offline scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRow {
    pub trace_id: String,
    pub user_input: String,
    pub response: String,
    pub retrieved_contexts: Vec<String>,
}

impl EvalRow {
    /// Rows missing any of the three fields cannot be scored.
    pub fn is_complete(&self) -> bool {
        !self.user_input.is_empty() && !self.response.is_empty() && !self.retrieved_contexts.is_empty()
    }
}

/// Coerce an arbitrary JSON value into a list of strings.
///
/// `null` is empty, a string is a single item, an object contributes its
/// `text` or `page_content` field (else its JSON form) and an array
/// contributes one item per element.
pub fn normalize_to_str_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Object(map) => {
            let picked = map.get("text").or_else(|| map.get("page_content"));
            match picked {
                Some(inner) => vec![stringify(inner)],
                None => vec![value.to_string()],
            }
        }
        Value::Array(items) => items.iter().map(stringify).collect(),
        other => vec![other.to_string()],
    }
}

/// Byte payloads decode lossily into a single item.
pub fn normalize_bytes(bytes: &[u8]) -> Vec<String> {
    vec![String::from_utf8_lossy(bytes).into_owned()]
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// First key whose value is present and non-empty.
fn first_present<'a>(section: Option<&'a Value>, keys: &[&str]) -> Option<&'a Value> {
    let section = section?;
    keys.iter()
        .filter_map(|key| section.get(*key))
        .find(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            _ => true,
        })
}

/// Pull an evaluation row out of one trace object.
pub fn extract_eval_row(trace: &Value) -> EvalRow {
    let input = trace.get("input");
    let output = trace.get("output");

    let trace_id = trace
        .get("trace_id")
        .or_else(|| trace.get("id"))
        .map(stringify)
        .unwrap_or_default();
    let user_input = first_present(input, &["user_input", "query", "question"])
        .map(stringify)
        .unwrap_or_default();
    let response = first_present(output, &["response", "answer"])
        .map(stringify)
        .unwrap_or_default();
    let retrieved_contexts = first_present(
        output,
        &["retrieved_contexts", "retrieved_context", "contexts"],
    )
    .map(normalize_to_str_list)
    .unwrap_or_default();

    EvalRow {
        trace_id,
        user_input,
        response,
        retrieved_contexts,
    }
}

fn has_tag(trace: &Value, tag: &str) -> bool {
    trace
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().any(|t| t.as_str() == Some(tag)))
        .unwrap_or(false)
}

/// Read complete evaluation rows from a JSONL trace log, newest first.
///
/// `tag` keeps only traces carrying it. `limit` caps how many of the newest
/// matching traces are considered before incomplete rows are dropped.
/// Lines that are not valid JSON are skipped with a warning.
pub fn export_eval_rows(
    trace_path: &Path,
    tag: Option<&str>,
    limit: Option<usize>,
) -> AppResult<Vec<EvalRow>> {
    if !trace_path.exists() {
        tracing::warn!("No trace log at {:?}", trace_path);
        return Ok(Vec::new());
    }

    let file = File::open(trace_path)
        .map_err(|e| AppError::Other(format!("Failed to open trace log: {}", e)))?;

    let mut traces = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(trace) => traces.push(trace),
            Err(e) => tracing::warn!("Skipping trace line {}: {}", line_num + 1, e),
        }
    }

    let matching = traces
        .iter()
        .rev()
        .filter(|trace| tag.map_or(true, |t| has_tag(trace, t)))
        .take(limit.unwrap_or(usize::MAX));

    let rows: Vec<EvalRow> = matching
        .map(extract_eval_row)
        .filter(EvalRow::is_complete)
        .collect();

    tracing::info!("Exported {} evaluation rows from {:?}", rows.len(), trace_path);
    Ok(rows)
}
