//! Prompt builder: renders definitions with Handlebars.

use crate::loader::{
    load_builtin_prompt, load_prompt, DIRECT_PROMPT_ID, GROUNDED_PROMPT_ID, ROUTER_PROMPT_ID,
};
use crate::types::{BuiltPrompt, PromptDefinition};
use arag_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;
use std::path::Path;

/// Render both the system and user templates of a definition.
///
/// # Example
/// ```no_run
/// use arag_prompt::{build_prompt, PromptDefinition};
/// use std::collections::HashMap;
///
/// # fn example(def: PromptDefinition) -> Result<(), Box<dyn std::error::Error>> {
/// let mut vars = HashMap::new();
/// vars.insert("query".to_string(), "What is Rust?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, &variables))
        .transpose()?;

    let user = render_template(&definition.template, &variables)?;

    Ok(BuiltPrompt::new(
        system,
        user,
        definition.id.clone(),
        variables,
    ))
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text output; source text must reach the model unescaped.
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", &variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

/// The three prompts the query pipeline needs, loaded once at startup.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub router: PromptDefinition,
    pub direct: PromptDefinition,
    pub grounded: PromptDefinition,
}

impl PromptSet {
    /// Load the pipeline prompts, honoring workspace overrides in `prompts_dir`.
    pub fn load(prompts_dir: &Path) -> AppResult<Self> {
        Ok(Self {
            router: load_prompt(prompts_dir, ROUTER_PROMPT_ID)?,
            direct: load_prompt(prompts_dir, DIRECT_PROMPT_ID)?,
            grounded: load_prompt(prompts_dir, GROUNDED_PROMPT_ID)?,
        })
    }

    /// Built-in prompts only.
    pub fn builtin() -> AppResult<Self> {
        Ok(Self {
            router: load_builtin_prompt(ROUTER_PROMPT_ID)?,
            direct: load_builtin_prompt(DIRECT_PROMPT_ID)?,
            grounded: load_builtin_prompt(GROUNDED_PROMPT_ID)?,
        })
    }

    /// Render the router prompt for `query`.
    pub fn router(&self, query: &str) -> AppResult<BuiltPrompt> {
        build_prompt(&self.router, vars(&[("query", query)]))
    }

    /// Render the direct persona prompt for `query`.
    pub fn direct(&self, query: &str) -> AppResult<BuiltPrompt> {
        build_prompt(&self.direct, vars(&[("query", query)]))
    }

    /// Render the grounded prompt for `query` over a labeled source context.
    pub fn grounded(&self, query: &str, context: &str) -> AppResult<BuiltPrompt> {
        build_prompt(
            &self.grounded,
            vars(&[("query", query), ("context", context)]),
        )
    }
}

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
