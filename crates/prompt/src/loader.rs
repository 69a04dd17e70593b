//! Prompt loader.
//!
//! Built-in definitions are compiled into the binary. A workspace may
//! override any of them by dropping `<id>.yml` into `.arag/prompts/`.

use crate::types::PromptDefinition;
use arag_core::{AppError, AppResult};
use std::path::Path;

/// Prompt deciding between a direct answer and retrieval.
pub const ROUTER_PROMPT_ID: &str = "rag.router";
/// Persona prompt for conversational answers without documents.
pub const DIRECT_PROMPT_ID: &str = "rag.direct";
/// Prompt for answers grounded in labeled sources.
pub const GROUNDED_PROMPT_ID: &str = "rag.grounded";

const BUILTIN_PROMPTS: [(&str, &str); 3] = [
    (ROUTER_PROMPT_ID, include_str!("../prompts/rag.router.yml")),
    (DIRECT_PROMPT_ID, include_str!("../prompts/rag.direct.yml")),
    (GROUNDED_PROMPT_ID, include_str!("../prompts/rag.grounded.yml")),
];

/// Load a prompt definition by ID.
///
/// Looks for `<id>.yml` in `prompts_dir` first, then falls back to the
/// built-in definition with the same ID.
///
/// # Example
/// ```no_run
/// use arag_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new(".arag/prompts"), "rag.grounded")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(prompts_dir: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir.join(format!("{}.yml", prompt_id));

    if !prompt_file.exists() {
        return load_builtin_prompt(prompt_id);
    }

    tracing::debug!("Loading prompt override from: {:?}", prompt_file);
    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    parse_definition(&contents, &prompt_file.display().to_string(), prompt_id)
}

/// Load a compiled-in prompt definition, ignoring workspace overrides.
pub fn load_builtin_prompt(prompt_id: &str) -> AppResult<PromptDefinition> {
    let source = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .map(|(_, source)| *source)
        .ok_or_else(|| AppError::Prompt(format!("Prompt not found: {}", prompt_id)))?;

    parse_definition(source, &format!("builtin:{}", prompt_id), prompt_id)
}

fn parse_definition(contents: &str, origin: &str, prompt_id: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e))
    })?;

    validate_prompt(&definition)?;

    if definition.id != prompt_id {
        return Err(AppError::Prompt(format!(
            "Prompt {} declares id '{}', expected '{}'",
            origin, definition.id, prompt_id
        )));
    }

    tracing::debug!("Loaded prompt: {} ({}) from {}", definition.id, definition.title, origin);

    Ok(definition)
}

/// List all available prompt IDs: built-ins plus workspace files.
pub fn list_prompts(prompts_dir: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: Vec<String> = BUILTIN_PROMPTS
        .iter()
        .map(|(id, _)| id.to_string())
        .collect();

    if prompts_dir.exists() {
        for entry in walkdir::WalkDir::new(prompts_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !prompt_ids.iter().any(|id| id == stem) {
                        prompt_ids.push(stem.to_string());
                    }
                }
            }
        }
    }

    Ok(prompt_ids)
}

fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, id: &str, body: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(format!("{}.yml", id)), body).unwrap();
    }

    #[test]
    fn test_builtins_load_and_validate() {
        let temp_dir = TempDir::new().unwrap();
        for id in [ROUTER_PROMPT_ID, DIRECT_PROMPT_ID, GROUNDED_PROMPT_ID] {
            let def = load_prompt(temp_dir.path(), id).unwrap();
            assert_eq!(def.id, id);
            assert!(def.system.is_some());
        }
    }

    #[test]
    fn test_grounded_builtin_text() {
        let temp_dir = TempDir::new().unwrap();
        let def = load_prompt(temp_dir.path(), GROUNDED_PROMPT_ID).unwrap();
        let system = def.system.unwrap();
        assert!(system.contains("Cite every factual claim with [S1], [S2], etc."));
        assert!(system.ends_with("End with a declarative sentence."));
        assert!(def.template.starts_with("QUESTION:\n{{query}}"));
    }

    #[test]
    fn test_workspace_override_wins() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            ROUTER_PROMPT_ID,
            "id: rag.router\ntitle: Custom\napiVersion: \"1.1\"\nsystem: pick one\ntemplate: \"{{query}}\"\n",
        );

        let def = load_prompt(temp_dir.path(), ROUTER_PROMPT_ID).unwrap();
        assert_eq!(def.title, "Custom");
        assert_eq!(def.system.as_deref(), Some("pick one"));
    }

    #[test]
    fn test_override_with_mismatched_id_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            DIRECT_PROMPT_ID,
            "id: other\ntitle: X\napiVersion: \"1.0\"\ntemplate: hi\n",
        );
        assert!(load_prompt(temp_dir.path(), DIRECT_PROMPT_ID).is_err());
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "invalid", "invalid: yaml: content:");
        assert!(load_prompt(temp_dir.path(), "invalid").is_err());
    }

    #[test]
    fn test_list_prompts() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            "custom.summary",
            "id: custom.summary\ntitle: S\napiVersion: \"1.0\"\ntemplate: x\n",
        );
        write_prompt(
            temp_dir.path(),
            ROUTER_PROMPT_ID,
            "id: rag.router\ntitle: R\napiVersion: \"1.0\"\ntemplate: x\n",
        );

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts.len(), 4);
        assert!(prompts.contains(&"custom.summary".to_string()));
        assert!(prompts.contains(&GROUNDED_PROMPT_ID.to_string()));
    }
}
