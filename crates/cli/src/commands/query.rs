//! Query command handlers: retrieve, ask and chat.

use super::services::{pipeline, print_json, registry};
use arag_core::{config::AppConfig, AppResult};
use arag_knowledge::parse_file_tags;
use arag_knowledge::rag::{AgenticAskRequest, AskRequest, RetrieveRequest};
use arag_knowledge::Citation;
use clap::Args;

/// Retrieval and generation knobs shared by `ask` and `chat`.
#[derive(Args, Debug, Clone)]
pub struct AnswerArgs {
    /// Number of chunks to retrieve (1-50, default from config)
    #[arg(short = 'k', long)]
    pub k: Option<usize>,

    /// Restrict retrieval to these doc ids
    #[arg(long = "doc-id")]
    pub doc_ids: Vec<String>,

    /// Context budget in characters (1000-80000)
    #[arg(long)]
    pub max_context_chars: Option<usize>,

    /// Sampling temperature (0.0-2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AnswerArgs {
    fn request(&self, query: String, config: &AppConfig) -> AskRequest {
        let mut request = AskRequest::new(query, &config.query);
        request.provider = config.provider.clone();
        if let Some(k) = self.k {
            request.k = k;
        }
        if !self.doc_ids.is_empty() {
            request.doc_ids = Some(self.doc_ids.clone());
        }
        if let Some(max) = self.max_context_chars {
            request.max_context_chars = max;
        }
        if let Some(temperature) = self.temperature {
            request.temperature = temperature;
        }
        request
    }
}

/// Show the nearest chunks for a query
#[derive(Args, Debug)]
pub struct RetrieveCommand {
    pub query: String,

    /// Number of chunks to return (1-50, default from config)
    #[arg(short = 'k', long)]
    pub k: Option<usize>,

    /// Restrict retrieval to these doc ids
    #[arg(long = "doc-id")]
    pub doc_ids: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RetrieveCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let request = RetrieveRequest {
            query: self.query.clone(),
            k: self.k.unwrap_or(config.query.k),
            doc_ids: (!self.doc_ids.is_empty()).then(|| self.doc_ids.clone()),
        };
        request.validate()?;

        let response = pipeline(config).await?.retrieve(request).await?;

        if self.json {
            return print_json(&response);
        }
        if response.results.is_empty() {
            println!("No matching chunks.");
            return Ok(());
        }
        for (rank, result) in response.results.iter().enumerate() {
            println!("{}. {} ({})", rank + 1, result.id, format_score(result.score));
            println!("   {}", preview(&result.text, 160));
        }
        Ok(())
    }
}

/// Answer from retrieved documents (no routing, no memory)
#[derive(Args, Debug)]
pub struct AskCommand {
    pub query: String,

    #[command(flatten)]
    pub args: AnswerArgs,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let request = self.args.request(self.query.clone(), config);
        request.validate()?;

        let response = pipeline(config).await?.ask(request).await?;

        if self.args.json {
            return print_json(&response);
        }
        println!("{}", response.answer);
        print_citations(&response.citations);
        Ok(())
    }
}

/// Routed answer; `@file.pdf` in the query restricts retrieval to that file
#[derive(Args, Debug)]
pub struct ChatCommand {
    pub query: String,

    /// Session id for multi-turn memory (requires memory.enabled)
    #[arg(long, env = "ARAG_SESSION")]
    pub session: Option<String>,

    #[command(flatten)]
    pub args: AnswerArgs,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let (query, tagged) = parse_file_tags(&self.query, &registry(config))?;
        if !tagged.is_empty() {
            tracing::info!("Resolved {} @file tags", tagged.len());
        }

        let mut ask = self.args.request(query, config);
        if !tagged.is_empty() {
            let mut doc_ids = ask.doc_ids.take().unwrap_or_default();
            for id in tagged {
                if !doc_ids.contains(&id) {
                    doc_ids.push(id);
                }
            }
            ask.doc_ids = Some(doc_ids);
        }

        let request = AgenticAskRequest {
            ask,
            session_id: self.session.clone(),
        };
        request.validate()?;

        let pipeline = pipeline(config).await?;
        if self.session.is_some() && !pipeline.memory_available() {
            tracing::warn!("--session given but conversation memory is disabled");
        }
        let response = pipeline.ask_agentic(request).await?;

        if self.args.json {
            return print_json(&response);
        }
        println!("{}", response.answer);
        print_citations(&response.citations);
        tracing::debug!(
            "route={} memory_enabled={}",
            response.route,
            response.memory_enabled
        );
        Ok(())
    }
}

fn print_citations(citations: &[Citation]) {
    if citations.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for citation in citations {
        let name = citation
            .metadata
            .get("source_name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        println!(
            "[{}] {} ({}, {})",
            citation.source_id,
            name,
            citation.chunk_id,
            format_score(citation.score)
        );
    }
}

fn format_score(score: Option<f32>) -> String {
    match score {
        Some(score) => format!("score {:.3}", score),
        None => "unscored".to_string(),
    }
}

fn preview(text: &str, limit: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}
