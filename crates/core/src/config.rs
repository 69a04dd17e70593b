//! Configuration management.
//!
//! Configuration is layered, later layers winning:
//! - Built-in defaults
//! - Config file (`.arag/config.yaml`, or `--config` / `ARAG_CONFIG`)
//! - Environment variables (`ARAG_*`)
//! - Command-line flags
//!
//! Everything the pipeline persists lives under the workspace's `.arag/` directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".arag";

/// The only language model provider the pipeline can talk to.
pub const SUPPORTED_LLM_PROVIDER: &str = "ollama";

const EMBEDDING_PROVIDERS: [&str; 2] = ["ollama", "trigram"];
const INDEX_BACKENDS: [&str; 2] = ["lancedb", "memory"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .arag/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Language model provider
    pub provider: String,

    /// Default chat model identifier
    pub model: String,

    /// Base URL of the Ollama server (chat and embeddings)
    pub ollama_base_url: String,

    /// Timeout applied to every blocking model/embedding call
    pub request_timeout_secs: u64,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    pub embeddings: EmbeddingSettings,
    pub index: IndexSettings,
    pub ingest: IngestSettings,
    pub query: QuerySettings,
    pub memory: MemorySettings,
    pub tracing: TraceSettings,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// "ollama" or "trigram" (offline, deterministic)
    pub provider: String,
    pub model: String,
    /// Expected vector width; checked against the first response
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "mxbai-embed-large:latest".to_string(),
            dimensions: 1024,
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexSettings {
    /// "lancedb" (persistent) or "memory"
    pub backend: String,
    /// Table name inside the index
    pub collection: String,
    /// Index directory; defaults to `.arag/index`
    pub path: Option<PathBuf>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: "lancedb".to_string(),
            collection: "agentic_rag".to_string(),
            path: None,
        }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks buffered before each embed-and-write flush
    pub batch_size: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 200,
            batch_size: 64,
        }
    }
}

/// Defaults applied to query requests that leave a field unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuerySettings {
    pub k: usize,
    pub max_context_chars: usize,
    pub temperature: f32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            k: 6,
            max_context_chars: 12000,
            temperature: 0.0,
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemorySettings {
    pub enabled: bool,
    /// SQLite file; defaults to `.arag/memory.sqlite`
    pub path: Option<PathBuf>,
}

/// Trace sink settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraceSettings {
    pub enabled: bool,
    /// JSONL file; defaults to `.arag/traces.jsonl`
    pub path: Option<PathBuf>,
    /// Tags stamped on every record
    pub tags: Vec<String>,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            tags: vec!["agentic-rag".to_string()],
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSection>,
    embeddings: Option<EmbeddingSettings>,
    index: Option<IndexSettings>,
    ingest: Option<IngestSettings>,
    query: Option<QuerySettings>,
    memory: Option<MemorySettings>,
    tracing: Option<TraceSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmSection {
    provider: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: SUPPORTED_LLM_PROVIDER.to_string(),
            model: "gemma3:4b".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            request_timeout_secs: 120,
            log_level: None,
            verbose: false,
            no_color: false,
            embeddings: EmbeddingSettings::default(),
            index: IndexSettings::default(),
            ingest: IngestSettings::default(),
            query: QuerySettings::default(),
            memory: MemorySettings::default(),
            tracing: TraceSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and the process environment.
    ///
    /// Environment variables:
    /// - `ARAG_WORKSPACE`, `ARAG_CONFIG`
    /// - `ARAG_PROVIDER`, `ARAG_MODEL`, `ARAG_OLLAMA_BASE_URL`, `ARAG_REQUEST_TIMEOUT`
    /// - `ARAG_EMBED_PROVIDER`, `ARAG_EMBED_MODEL`
    /// - `ARAG_COLLECTION`
    /// - `ARAG_MEMORY_DB` (setting it enables memory)
    /// - `ARAG_TRACE_ENABLED`
    /// - `RUST_LOG`, `NO_COLOR`
    ///
    /// # Example
    /// ```no_run
    /// use arag_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::load`] with an explicit variable lookup.
    pub fn load_with<F>(env: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(workspace) = env("ARAG_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }
        if let Some(config_file) = env("ARAG_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env(env)?;
        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(llm) = file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            if let Some(base_url) = llm.base_url {
                result.ollama_base_url = base_url;
            }
            if let Some(timeout) = llm.timeout {
                result.request_timeout_secs = timeout;
            }
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(embeddings) = file.embeddings {
            result.embeddings = embeddings;
        }
        if let Some(index) = file.index {
            result.index = index;
        }
        if let Some(ingest) = file.ingest {
            result.ingest = ingest;
        }
        if let Some(query) = file.query {
            result.query = query;
        }
        if let Some(memory) = file.memory {
            result.memory = memory;
        }
        if let Some(tracing) = file.tracing {
            result.tracing = tracing;
        }

        Ok(result)
    }

    fn apply_env<F>(&mut self, env: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = env("ARAG_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = env("ARAG_MODEL") {
            self.model = model;
        }
        if let Some(url) = env("ARAG_OLLAMA_BASE_URL") {
            self.ollama_base_url = url;
        }
        if let Some(timeout) = env("ARAG_REQUEST_TIMEOUT") {
            self.request_timeout_secs = timeout.parse().map_err(|_| {
                AppError::Config(format!("ARAG_REQUEST_TIMEOUT is not a number: {}", timeout))
            })?;
        }
        if let Some(provider) = env("ARAG_EMBED_PROVIDER") {
            self.embeddings.provider = provider;
        }
        if let Some(model) = env("ARAG_EMBED_MODEL") {
            self.embeddings.model = model;
        }
        if let Some(collection) = env("ARAG_COLLECTION") {
            self.index.collection = collection;
        }
        if let Some(db) = env("ARAG_MEMORY_DB") {
            self.memory.enabled = true;
            self.memory.path = Some(PathBuf::from(db));
        }
        if let Some(flag) = env("ARAG_TRACE_ENABLED") {
            self.tracing.enabled = parse_flag(&flag);
        }
        if let Some(level) = env("RUST_LOG") {
            self.log_level = Some(level);
        }
        if env("NO_COLOR").is_some() {
            self.no_color = true;
        }
        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .arag directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .arag directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    pub fn index_dir(&self) -> PathBuf {
        self.index
            .path
            .clone()
            .unwrap_or_else(|| self.state_dir().join("index"))
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.state_dir().join("uploads")
    }

    pub fn documents_path(&self) -> PathBuf {
        self.state_dir().join("documents.jsonl")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.state_dir().join("prompts")
    }

    pub fn memory_db_path(&self) -> PathBuf {
        self.memory
            .path
            .clone()
            .unwrap_or_else(|| self.state_dir().join("memory.sqlite"))
    }

    pub fn trace_path(&self) -> PathBuf {
        self.tracing
            .path
            .clone()
            .unwrap_or_else(|| self.state_dir().join("traces.jsonl"))
    }

    /// Validate configuration before any collaborator is constructed.
    pub fn validate(&self) -> AppResult<()> {
        if self.provider.to_lowercase() != SUPPORTED_LLM_PROVIDER {
            return Err(AppError::Config(
                "Only the Ollama provider is supported in this project.".to_string(),
            ));
        }

        if !EMBEDDING_PROVIDERS.contains(&self.embeddings.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embeddings.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embeddings.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        if !INDEX_BACKENDS.contains(&self.index.backend.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown index backend: {}. Supported: {}",
                self.index.backend,
                INDEX_BACKENDS.join(", ")
            )));
        }

        if self.ingest.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be greater than zero".to_string()));
        }

        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(AppError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }

        if self.ingest.batch_size == 0 {
            return Err(AppError::Config("batch_size must be greater than zero".to_string()));
        }

        if self.ollama_base_url.trim().is_empty() {
            return Err(AppError::Config("Ollama base URL is empty".to_string()));
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "gemma3:4b");
        assert_eq!(config.embeddings.model, "mxbai-embed-large:latest");
        assert_eq!(config.index.collection, "agentic_rag");
        assert_eq!(config.ingest.chunk_size, 1200);
        assert_eq!(config.ingest.chunk_overlap, 200);
        assert_eq!(config.ingest.batch_size, 64);
        assert_eq!(config.query.k, 6);
        assert_eq!(config.query.max_context_chars, 12000);
        assert!(!config.memory.enabled);
        assert!(config.tracing.enabled);
    }

    #[test]
    fn test_state_paths() {
        let mut config = AppConfig::default();
        config.workspace = PathBuf::from("/tmp/ws");
        assert_eq!(config.state_dir(), PathBuf::from("/tmp/ws/.arag"));
        assert_eq!(config.index_dir(), PathBuf::from("/tmp/ws/.arag/index"));
        assert_eq!(
            config.memory_db_path(),
            PathBuf::from("/tmp/ws/.arag/memory.sqlite")
        );
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("ollama".to_string()),
            Some("llama3.2".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.model, "llama3.2");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
llm:
  model: qwen2.5:7b
  baseUrl: http://gpu-box:11434
ingest:
  chunk_size: 800
  chunk_overlap: 100
memory:
  enabled: true
logging:
  color: false
"#,
        )
        .unwrap();

        let config = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(config.model, "qwen2.5:7b");
        assert_eq!(config.ollama_base_url, "http://gpu-box:11434");
        assert_eq!(config.ingest.chunk_size, 800);
        assert_eq!(config.ingest.chunk_overlap, 100);
        // unspecified fields in a section fall back to defaults
        assert_eq!(config.ingest.batch_size, 64);
        assert!(config.memory.enabled);
        assert!(config.no_color);
    }

    #[test]
    fn test_load_with_env_layers() {
        let temp = TempDir::new().unwrap();
        let state = temp.path().join(STATE_DIR);
        std::fs::create_dir_all(&state).unwrap();
        std::fs::write(state.join("config.yaml"), "llm:\n  model: from-yaml\n").unwrap();

        let mut vars = HashMap::new();
        vars.insert("ARAG_WORKSPACE", temp.path().to_string_lossy().to_string());
        vars.insert("ARAG_EMBED_PROVIDER", "trigram".to_string());
        vars.insert("ARAG_MEMORY_DB", "/tmp/mem.sqlite".to_string());
        vars.insert("ARAG_TRACE_ENABLED", "false".to_string());

        let config = AppConfig::load_with(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.model, "from-yaml");
        assert_eq!(config.embeddings.provider, "trigram");
        assert!(config.memory.enabled);
        assert_eq!(config.memory_db_path(), PathBuf::from("/tmp/mem.sqlite"));
        assert!(!config.tracing.enabled);
    }

    #[test]
    fn test_load_with_missing_workspace() {
        let result = AppConfig::load_with(|k| {
            (k == "ARAG_WORKSPACE").then(|| "/definitely/not/here".to_string())
        });
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_other_llm_providers() {
        let mut config = AppConfig::default();
        config.provider = "openai".to_string();
        let err = config.validate().unwrap_err();
        assert!(err
            .to_string()
            .contains("Only the Ollama provider is supported in this project."));
    }

    #[test]
    fn test_validate_chunking() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.ingest.chunk_overlap = config.ingest.chunk_size;
        assert!(config.validate().is_err());

        config.ingest.chunk_overlap = 0;
        config.ingest.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_backend() {
        let mut config = AppConfig::default();
        config.index.backend = "chroma".to_string();
        assert!(config.validate().is_err());
    }
}
