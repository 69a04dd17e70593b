//! Query-time half of the system.
//!
//! Context packing, routing, answering and finalizing are separate
//! stages; `pipeline` strings them together for the classic and the
//! routed (agentic) paths. Conversation memory, tracing and evaluation
//! export live here as well since only the query path produces them.

pub mod answer;
pub mod context;
pub mod conversation;
pub mod eval;
pub mod finalize;
pub mod pipeline;
pub mod router;
pub mod trace;
pub mod types;

pub use answer::{answer_direct, answer_grounded, Generation};
pub use context::build_context;
pub use conversation::{
    open_store, ConversationStore, MemoryConversationStore, SqliteConversationStore,
};
pub use eval::{export_eval_rows, extract_eval_row, normalize_to_str_list, EvalRow};
pub use finalize::finalize;
pub use pipeline::RagPipeline;
pub use router::{classify, parse_route};
pub use trace::{open_sink, JsonlTraceSink, TraceRecord, TraceSink};
pub use types::{
    AgenticAskRequest, AgenticAskResponse, AskRequest, AskResponse, RetrieveRequest,
    RetrieveResponse, RetrievedResult, Route,
};
