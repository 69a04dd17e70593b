//! Prompt system.
//!
//! This crate provides structured prompt management with:
//! - YAML prompt definitions, built in and overridable per workspace
//! - Handlebars rendering of system and user templates

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_prompt, PromptSet};
pub use loader::{
    list_prompts, load_builtin_prompt, load_prompt, DIRECT_PROMPT_ID, GROUNDED_PROMPT_ID, ROUTER_PROMPT_ID,
};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
