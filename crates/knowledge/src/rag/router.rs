//! Single-call routing between a direct reply and retrieval.

use super::answer::{generate, prompt_messages, Generation};
use super::types::Route;
use arag_core::AppResult;
use arag_llm::{ChatMessage, LlmClient};
use arag_prompt::PromptSet;

/// Lenient parse of the router's output: anything mentioning "retrieve"
/// retrieves, everything else is answered directly. Never fails.
pub fn parse_route(output: &str) -> Route {
    if output.trim().to_lowercase().contains("retrieve") {
        Route::Retrieve
    } else {
        Route::Direct
    }
}

/// Ask the model whether `query` needs documents.
///
/// Prior turns, when present, sit between the router instruction and the
/// query so follow-ups like "and the second one?" route sensibly.
pub async fn classify(
    llm: &dyn LlmClient,
    prompts: &PromptSet,
    query: &str,
    history: &[ChatMessage],
    generation: &Generation,
) -> AppResult<Route> {
    let messages = prompt_messages(prompts.router(query)?, history);
    let output = generate(llm, messages, generation).await?;
    let route = parse_route(&output);

    tracing::debug!("Router output {:?} -> {}", output.trim(), route);
    Ok(route)
}
