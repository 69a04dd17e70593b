//! Command handlers for the arag CLI.
//!
//! `services` is the composition root: every command that touches the
//! index or a model builds its collaborators there, once per process.

pub mod config;
pub mod documents;
pub mod eval;
pub mod ingest;
pub mod query;
pub mod services;

// Re-export command types for convenience
pub use config::ConfigCommand;
pub use documents::DocumentsCommand;
pub use eval::EvalCommand;
pub use ingest::IngestCommand;
pub use query::{AskCommand, ChatCommand, RetrieveCommand};
