//! Answer generation: direct persona replies and grounded, cited answers.

use super::context::build_context;
use crate::types::Source;
use arag_core::AppResult;
use arag_llm::{ChatMessage, LlmClient, LlmRequest};
use arag_prompt::{BuiltPrompt, PromptSet};

/// Model selection for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub model: String,
    pub temperature: f32,
}

/// System prompt, then prior turns, then the rendered user message.
pub(crate) fn prompt_messages(prompt: BuiltPrompt, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if let Some(system) = prompt.system {
        messages.push(ChatMessage::system(system));
    }
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(prompt.user));
    messages
}

/// One model call. Provider errors propagate untouched.
pub(crate) async fn generate(
    llm: &dyn LlmClient,
    messages: Vec<ChatMessage>,
    generation: &Generation,
) -> AppResult<String> {
    let request = LlmRequest::new(messages, generation.model.clone())
        .with_temperature(generation.temperature);
    let response = llm.complete(&request).await?;
    Ok(response.content)
}

/// Conversational answer with no document context. Returns trimmed text.
pub async fn answer_direct(
    llm: &dyn LlmClient,
    prompts: &PromptSet,
    query: &str,
    history: &[ChatMessage],
    generation: &Generation,
) -> AppResult<String> {
    let messages = prompt_messages(prompts.direct(query)?, history);
    let answer = generate(llm, messages, generation).await?;
    Ok(answer.trim().to_string())
}

/// Answer strictly from `sources`, citing them as `[S1]`, `[S2]`, ...
///
/// Returns the trimmed answer and the sources that fit the context budget.
/// Those kept sources are the citation basis whether or not the model
/// actually cited each one.
pub async fn answer_grounded(
    llm: &dyn LlmClient,
    prompts: &PromptSet,
    query: &str,
    sources: &[Source],
    max_context_chars: usize,
    generation: &Generation,
) -> AppResult<(String, Vec<Source>)> {
    let (context, kept) = build_context(sources, max_context_chars);
    tracing::debug!(
        "Grounded context: {} of {} sources, {} chars",
        kept.len(),
        sources.len(),
        context.chars().count()
    );

    let messages = prompt_messages(prompts.grounded(query, &context)?, &[]);
    let answer = generate(llm, messages, generation).await?;
    Ok((answer.trim().to_string(), kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::testing::ScriptedLlm;
    use crate::types::Metadata;
    use arag_core::AppError;
    use arag_llm::Role;

    fn generation() -> Generation {
        Generation {
            model: "gemma3:4b".to_string(),
            temperature: 0.2,
        }
    }

    fn source(id: &str, text: &str) -> Source {
        Source {
            source_id: id.to_string(),
            chunk_id: format!("doc:0:{}", id),
            score: Some(0.9),
            text: text.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_direct_includes_history_between_system_and_query() {
        let llm = ScriptedLlm::new(["  Hello there.  "]);
        let prompts = PromptSet::builtin().unwrap();
        let history = vec![
            ChatMessage::user("My name is Ana"),
            ChatMessage::assistant("Nice to meet you, Ana."),
        ];

        let answer = answer_direct(&llm, &prompts, "hi", &history, &generation())
            .await
            .unwrap();
        assert_eq!(answer, "Hello there.");

        let request = llm.request(0);
        assert_eq!(request.model, "gemma3:4b");
        assert_eq!(request.temperature, Some(0.2));
        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(request.messages[3].content, "hi");
        assert!(request.messages[0]
            .content
            .contains("CURRENT MODE: Direct Response"));
    }

    #[tokio::test]
    async fn test_grounded_sends_labeled_sources_and_returns_kept() {
        let llm = ScriptedLlm::new(["Refunds take 30 days [S1]."]);
        let prompts = PromptSet::builtin().unwrap();
        let sources = vec![source("S1", &"a".repeat(1000)), source("S2", &"b".repeat(1000))];

        let (answer, kept) =
            answer_grounded(&llm, &prompts, "How long?", &sources, 1500, &generation())
                .await
                .unwrap();

        assert_eq!(answer, "Refunds take 30 days [S1].");
        assert_eq!(kept.len(), 1);

        let request = llm.request(0);
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[1].content.starts_with("QUESTION:\nHow long?\n\nSOURCES:\n[S1] aaa"));
        assert!(!request.messages[1].content.contains("[S2]"));
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let llm = ScriptedLlm::failing("timed out");
        let prompts = PromptSet::builtin().unwrap();
        let result = answer_direct(&llm, &prompts, "hi", &[], &generation()).await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }
}
