//! Query pipeline: route, retrieve, answer, finalize.
//!
//! `RagPipeline` owns no global state. The composition root builds the
//! model client, retriever, conversation store and trace sink once and
//! hands them in, so tests can swap any of them for a fake.

use super::answer::{answer_direct, answer_grounded, Generation};
use super::conversation::ConversationStore;
use super::finalize::finalize;
use super::router::classify;
use super::trace::{TraceInput, TraceKind, TraceOutput, TraceRecord, TraceSink};
use super::types::{
    AgenticAskRequest, AgenticAskResponse, AskRequest, AskResponse, RetrieveRequest,
    RetrieveResponse, Route,
};
use crate::retrieval::Retriever;
use crate::types::{Citation, Source};
use arag_core::AppResult;
use arag_llm::{ChatMessage, LlmClient};
use arag_prompt::PromptSet;
use std::sync::Arc;

/// What the agentic path decided to do for one turn. Each branch carries
/// only what its answer step reads.
enum Plan {
    Direct {
        history: Vec<ChatMessage>,
    },
    Retrieve {
        sources: Vec<Source>,
        applied_filter: Option<serde_json::Value>,
    },
}

/// History loaded for a turn, and whether the turn will be persisted.
struct Memory {
    session_id: Option<String>,
    history: Vec<ChatMessage>,
}

impl Memory {
    fn stateless() -> Self {
        Self {
            session_id: None,
            history: Vec::new(),
        }
    }

    fn enabled(&self) -> bool {
        self.session_id.is_some()
    }
}

pub struct RagPipeline {
    llm: Arc<dyn LlmClient>,
    prompts: PromptSet,
    retriever: Retriever,
    store: Option<Arc<dyn ConversationStore>>,
    tracer: Option<Arc<dyn TraceSink>>,
    trace_tags: Vec<String>,
    default_model: String,
}

impl RagPipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: PromptSet,
        retriever: Retriever,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            prompts,
            retriever,
            store: None,
            tracer: None,
            trace_tags: Vec::new(),
            default_model: default_model.into(),
        }
    }

    pub fn with_store(mut self, store: Option<Arc<dyn ConversationStore>>) -> Self {
        self.store = store;
        self
    }

    pub fn with_tracer(mut self, tracer: Option<Arc<dyn TraceSink>>, tags: Vec<String>) -> Self {
        self.tracer = tracer;
        self.trace_tags = tags;
        self
    }

    /// Whether a conversation store is attached.
    pub fn memory_available(&self) -> bool {
        self.store.is_some()
    }

    fn generation(&self, ask: &AskRequest) -> Generation {
        Generation {
            model: ask
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            temperature: ask.temperature,
        }
    }

    async fn fetch_sources(
        &self,
        query: &str,
        k: usize,
        doc_ids: Option<&[String]>,
    ) -> AppResult<(Vec<Source>, Option<serde_json::Value>)> {
        let retrieval = self.retriever.retrieve(query, k, doc_ids).await?;
        let applied_filter = retrieval.applied_filter.as_ref().map(|f| f.to_json());
        Ok((Source::label_all(retrieval.rows), applied_filter))
    }

    /// Nearest chunks for a query, no generation.
    pub async fn retrieve(&self, request: RetrieveRequest) -> AppResult<RetrieveResponse> {
        request.validate()?;

        let retrieval = self
            .retriever
            .retrieve(&request.query, request.k, request.doc_ids.as_deref())
            .await?;

        Ok(RetrieveResponse {
            applied_filter: retrieval.applied_filter.as_ref().map(|f| f.to_json()),
            results: retrieval.rows.into_iter().map(Into::into).collect(),
            query: request.query,
            k: request.k,
        })
    }

    /// Classic path: always retrieve, answer from sources, finalize.
    pub async fn ask(&self, request: AskRequest) -> AppResult<AskResponse> {
        request.validate()?;
        tracing::info!("Answering query (k={})", request.k);

        let generation = self.generation(&request);
        let (sources, applied_filter) = self
            .fetch_sources(&request.query, request.k, request.doc_ids.as_deref())
            .await?;

        let (raw, kept) = answer_grounded(
            self.llm.as_ref(),
            &self.prompts,
            &request.query,
            &sources,
            request.max_context_chars,
            &generation,
        )
        .await?;
        let answer = finalize(&raw);

        self.trace(
            TraceKind::Rag,
            TraceInput {
                user_input: request.query.clone(),
                k: request.k,
                doc_ids: request.doc_ids.clone(),
                applied_filter: applied_filter.clone(),
            },
            TraceOutput::new(&answer, &sources),
        );

        Ok(AskResponse {
            citations: citations(&kept),
            query: request.query,
            answer,
            used_k: request.k,
            applied_filter,
        })
    }

    /// Routed path with optional per-session memory.
    ///
    /// Memory is active only when the request names a session and a store
    /// is attached and readable. Store failures fall back to a stateless
    /// turn.
    pub async fn ask_agentic(&self, request: AgenticAskRequest) -> AppResult<AgenticAskResponse> {
        request.validate()?;
        let ask = &request.ask;
        let generation = self.generation(ask);

        let mut memory = self.load_memory(request.session_id.as_deref()).await;

        let route = classify(
            self.llm.as_ref(),
            &self.prompts,
            &ask.query,
            &memory.history,
            &generation,
        )
        .await?;
        tracing::info!("Routed query to {}", route);

        let plan = match route {
            Route::Direct => Plan::Direct {
                history: std::mem::take(&mut memory.history),
            },
            Route::Retrieve => {
                let (sources, applied_filter) = self
                    .fetch_sources(&ask.query, ask.k, ask.doc_ids.as_deref())
                    .await?;
                Plan::Retrieve {
                    sources,
                    applied_filter,
                }
            }
        };

        let (raw, cited, offered, applied_filter) = match plan {
            Plan::Direct { history } => {
                let raw = answer_direct(
                    self.llm.as_ref(),
                    &self.prompts,
                    &ask.query,
                    &history,
                    &generation,
                )
                .await?;
                (raw, Vec::new(), Vec::new(), None)
            }
            Plan::Retrieve {
                sources,
                applied_filter,
            } => {
                let (raw, kept) = answer_grounded(
                    self.llm.as_ref(),
                    &self.prompts,
                    &ask.query,
                    &sources,
                    ask.max_context_chars,
                    &generation,
                )
                .await?;
                (raw, kept, sources, applied_filter)
            }
        };
        let answer = finalize(&raw);

        self.persist(&mut memory, &ask.query, &answer).await;
        let memory_enabled = memory.enabled();

        self.trace(
            TraceKind::Agentic,
            TraceInput {
                user_input: ask.query.clone(),
                k: ask.k,
                doc_ids: ask.doc_ids.clone(),
                applied_filter,
            },
            TraceOutput::new(&answer, &offered).with_route(route, memory_enabled),
        );

        Ok(AgenticAskResponse {
            answer,
            route,
            citations: citations(&cited),
            session_id: memory.session_id,
            memory_enabled,
        })
    }

    async fn load_memory(&self, session_id: Option<&str>) -> Memory {
        let (Some(session_id), Some(store)) = (session_id, self.store.as_ref()) else {
            return Memory::stateless();
        };

        match store.history(session_id).await {
            Ok(history) => {
                tracing::debug!("Loaded {} prior turns for session", history.len());
                Memory {
                    session_id: Some(session_id.to_string()),
                    history,
                }
            }
            Err(e) => {
                tracing::warn!("Conversation history unavailable, answering statelessly: {}", e);
                Memory::stateless()
            }
        }
    }

    async fn persist(&self, memory: &mut Memory, query: &str, answer: &str) {
        let (Some(session_id), Some(store)) = (memory.session_id.as_deref(), self.store.as_ref())
        else {
            return;
        };

        let turns = [ChatMessage::user(query), ChatMessage::assistant(answer)];
        if let Err(e) = store.append(session_id, &turns).await {
            tracing::warn!("Failed to persist conversation turn: {}", e);
            memory.session_id = None;
        }
    }

    fn trace(&self, kind: TraceKind, input: TraceInput, output: TraceOutput) {
        let Some(tracer) = self.tracer.as_ref() else {
            return;
        };
        let record = TraceRecord::new(kind, &self.trace_tags, input, output);
        if let Err(e) = tracer.record(&record) {
            tracing::warn!("Skipping trace {}: {}", record.trace_id, e);
        }
    }
}

fn citations(sources: &[Source]) -> Vec<Citation> {
    sources.iter().map(Source::citation).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::TrigramProvider;
    use crate::embeddings::EmbeddingProvider;
    use crate::memory_index::MemoryIndex;
    use crate::rag::conversation::MemoryConversationStore;
    use crate::rag::testing::ScriptedLlm;
    use crate::rag::trace::JsonlTraceSink;
    use crate::types::{Chunk, IndexRecord, Metadata};
    use crate::vector_index::VectorIndex;
    use arag_core::config::QuerySettings;
    use arag_core::AppError;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const DIM: usize = 128;

    async fn seeded_retriever() -> Retriever {
        let embedder = Arc::new(TrigramProvider::new(DIM));
        let index = Arc::new(MemoryIndex::new(DIM));
        let docs = [
            ("policy", "Refunds are accepted within thirty days of purchase."),
            ("policy", "Shipping is free for orders above fifty euros."),
            ("manual", "Hold the power button for ten seconds to reset."),
        ];

        let mut records = Vec::new();
        for (i, (doc_id, text)) in docs.iter().enumerate() {
            let mut metadata = Metadata::new();
            metadata.insert("doc_id".to_string(), serde_json::json!(doc_id));
            records.push(IndexRecord {
                chunk: Chunk {
                    chunk_id: Chunk::make_id(doc_id, 0, i),
                    doc_id: doc_id.to_string(),
                    unit_index: 0,
                    chunk_index: i,
                    text: text.to_string(),
                    metadata,
                },
                embedding: embedder.embed(text).await.unwrap(),
            });
        }
        index.upsert(&records).await.unwrap();

        Retriever::new(embedder, index)
    }

    async fn pipeline(llm: Arc<ScriptedLlm>) -> RagPipeline {
        RagPipeline::new(
            llm,
            PromptSet::builtin().unwrap(),
            seeded_retriever().await,
            "gemma3:4b",
        )
    }

    fn agentic(query: &str, session_id: Option<&str>) -> AgenticAskRequest {
        AgenticAskRequest {
            ask: AskRequest::new(query, &QuerySettings::default()),
            session_id: session_id.map(str::to_string),
        }
    }

    /// Store that is reachable at startup but fails every call.
    struct BrokenStore;

    #[async_trait]
    impl ConversationStore for BrokenStore {
        fn backend_name(&self) -> &str {
            "broken"
        }
        async fn history(&self, _: &str) -> AppResult<Vec<ChatMessage>> {
            Err(AppError::Knowledge("connection refused".to_string()))
        }
        async fn append(&self, _: &str, _: &[ChatMessage]) -> AppResult<()> {
            Err(AppError::Knowledge("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_retrieve_returns_ranked_results() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
        let pipeline = pipeline(llm.clone()).await;

        let response = pipeline
            .retrieve(RetrieveRequest {
                query: "refund within thirty days".to_string(),
                k: 2,
                doc_ids: Some(vec!["policy".to_string()]),
            })
            .await
            .unwrap();

        assert_eq!(response.k, 2);
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].id, "policy:0:0");
        assert_eq!(
            response.applied_filter,
            Some(serde_json::json!({"doc_id": {"$in": ["policy"]}}))
        );
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_ask_finalizes_and_cites_kept_sources() {
        let llm = Arc::new(ScriptedLlm::new(["Refunds take thirty days [S1]. Any questions?"]));
        let pipeline = pipeline(llm.clone()).await;

        let mut request = AskRequest::new("How long do refunds take?", &QuerySettings::default());
        request.k = 2;
        let response = pipeline.ask(request).await.unwrap();

        assert_eq!(response.answer, "Refunds take thirty days [S1].");
        assert_eq!(response.used_k, 2);
        assert_eq!(response.citations.len(), 2);
        assert_eq!(response.citations[0].source_id, "S1");
        assert_eq!(response.citations[0].chunk_id, "policy:0:0");
        assert!(response.applied_filter.is_none());
    }

    #[tokio::test]
    async fn test_ask_rejects_invalid_request_before_any_call() {
        let llm = Arc::new(ScriptedLlm::new(["unused"]));
        let pipeline = pipeline(llm.clone()).await;

        let mut request = AskRequest::new("hi", &QuerySettings::default());
        request.provider = "openai".to_string();
        assert!(matches!(pipeline.ask(request).await, Err(AppError::Config(_))));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_agentic_direct_route_skips_retrieval() {
        let llm = Arc::new(ScriptedLlm::new(["direct", "Hello! How can I help?"]));
        let pipeline = pipeline(llm.clone()).await;

        let response = pipeline.ask_agentic(agentic("hello", None)).await.unwrap();

        assert_eq!(response.route, Route::Direct);
        assert_eq!(response.answer, "Hello! How can I help.");
        assert!(response.citations.is_empty());
        assert!(!response.memory_enabled);
        assert!(response.session_id.is_none());
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_agentic_retrieve_route_cites_sources() {
        let llm = Arc::new(ScriptedLlm::new([
            "retrieve",
            "Press the power button for ten seconds [S1].",
        ]));
        let pipeline = pipeline(llm.clone()).await;

        let mut request = agentic("How do I reset the device?", None);
        request.ask.doc_ids = Some(vec!["manual".to_string()]);
        let response = pipeline.ask_agentic(request).await.unwrap();

        assert_eq!(response.route, Route::Retrieve);
        assert_eq!(response.citations.len(), 1);
        assert_eq!(response.citations[0].chunk_id, "manual:0:2");

        let grounded = llm.request(1);
        assert!(grounded.messages[1].content.contains("[S1] Hold the power button"));
    }

    #[tokio::test]
    async fn test_agentic_memory_carries_history_across_turns() {
        let llm = Arc::new(ScriptedLlm::new([
            "direct",
            "Nice to meet you, Ana.",
            "direct",
            "Your name is Ana.",
        ]));
        let store: Arc<dyn ConversationStore> = Arc::new(MemoryConversationStore::new());
        let pipeline = pipeline(llm.clone()).await.with_store(Some(store.clone()));

        let first = pipeline
            .ask_agentic(agentic("My name is Ana", Some("s1")))
            .await
            .unwrap();
        assert!(first.memory_enabled);
        assert_eq!(first.session_id.as_deref(), Some("s1"));

        pipeline
            .ask_agentic(agentic("What is my name?", Some("s1")))
            .await
            .unwrap();

        // Second answer call sees system + two prior turns + query
        let answer_call = llm.request(3);
        assert_eq!(answer_call.messages.len(), 4);
        assert_eq!(answer_call.messages[1].content, "My name is Ana");
        assert_eq!(answer_call.messages[2].content, "Nice to meet you, Ana.");

        let history = store.history("s1").await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[3], ChatMessage::assistant("Your name is Ana."));
    }

    #[tokio::test]
    async fn test_agentic_without_store_is_stateless() {
        let llm = Arc::new(ScriptedLlm::new(["direct", "Hi."]));
        let pipeline = pipeline(llm).await;

        let response = pipeline.ask_agentic(agentic("hi", Some("s1"))).await.unwrap();
        assert!(!response.memory_enabled);
        assert!(response.session_id.is_none());
    }

    #[tokio::test]
    async fn test_agentic_store_failure_degrades() {
        let llm = Arc::new(ScriptedLlm::new(["direct", "Hi."]));
        let pipeline = pipeline(llm)
            .await
            .with_store(Some(Arc::new(BrokenStore)));

        let response = pipeline.ask_agentic(agentic("hi", Some("s1"))).await.unwrap();
        assert_eq!(response.answer, "Hi.");
        assert!(!response.memory_enabled);
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let llm = Arc::new(ScriptedLlm::failing("timed out"));
        let pipeline = pipeline(llm).await;

        let result = pipeline.ask_agentic(agentic("hi", None)).await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }

    #[tokio::test]
    async fn test_traces_are_written() {
        let temp = TempDir::new().unwrap();
        let sink = Arc::new(JsonlTraceSink::new(temp.path().join("traces.jsonl")));
        let llm = Arc::new(ScriptedLlm::new(["retrieve", "Free above fifty euros [S1]?"]));
        let pipeline = pipeline(llm)
            .await
            .with_tracer(Some(sink.clone()), vec!["agentic-rag".to_string()]);

        let response = pipeline
            .ask_agentic(agentic("Is shipping free?", None))
            .await
            .unwrap();
        assert_eq!(response.answer, "Free above fifty euros [S1].");

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let record: TraceRecord = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(record.name, "agentic_rag_query");
        assert_eq!(record.input.user_input, "Is shipping free?");
        assert_eq!(record.output.response, "Free above fifty euros [S1].");
        assert_eq!(record.output.retrieved_contexts.len(), 3);
        assert_eq!(record.output.route, Some(Route::Retrieve));
        assert!(record.tags.contains(&"agentic-rag".to_string()));
    }
}
