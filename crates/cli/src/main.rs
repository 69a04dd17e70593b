//! arag CLI
//!
//! Ingest documents into a local vector index and ask questions about
//! them, either through the classic retrieve-then-answer path or the
//! routed chat path with optional per-session memory.

mod commands;

use arag_core::{config::AppConfig, logging, AppResult};
use clap::{Parser, Subcommand};
use commands::{
    AskCommand, ChatCommand, ConfigCommand, DocumentsCommand, EvalCommand, IngestCommand,
    RetrieveCommand,
};
use std::path::PathBuf;

/// Agentic retrieval-augmented answering over your own documents
#[derive(Parser, Debug)]
#[command(name = "arag")]
#[command(about = "Agentic retrieval-augmented answering over local documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "ARAG_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file (default: .arag/config.yaml)
    #[arg(short, long, global = true, env = "ARAG_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (only ollama is supported)
    #[arg(short, long, global = true, env = "ARAG_PROVIDER")]
    provider: Option<String>,

    /// Chat model identifier
    #[arg(short, long, global = true, env = "ARAG_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload and index documents
    Ingest(IngestCommand),

    /// List or clear ingested documents
    Documents(DocumentsCommand),

    /// Show the nearest chunks for a query
    Retrieve(RetrieveCommand),

    /// Answer from retrieved documents (no routing)
    Ask(AskCommand),

    /// Routed answer with optional session memory and @file tags
    Chat(ChatCommand),

    /// Export evaluation rows from the trace log
    Eval(EvalCommand),

    /// Inspect the effective configuration
    Config(ConfigCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Ingest(_) => "ingest",
            Self::Documents(_) => "documents",
            Self::Retrieve(_) => "retrieve",
            Self::Ask(_) => "ask",
            Self::Chat(_) => "chat",
            Self::Eval(_) => "eval",
            Self::Config(_) => "config",
        }
    }
}

/// Defaults, then the config file, then `ARAG_*`, then flags.
///
/// The workspace and config file flags are known only after the first
/// load, so a file they point at is merged on top afterwards.
fn resolve_config(cli: &Cli) -> AppResult<AppConfig> {
    let mut config = AppConfig::load()?;

    let explicit_file = cli.config.clone().or_else(|| {
        cli.workspace
            .as_ref()
            .map(|ws| ws.join(arag_core::config::STATE_DIR).join("config.yaml"))
            .filter(|path| path.exists())
    });
    if let Some(path) = explicit_file {
        config = config.merge_yaml(&path)?;
    }

    Ok(config.with_overrides(
        cli.workspace.clone(),
        cli.config.clone(),
        cli.provider.clone(),
        cli.model.clone(),
        cli.log_level.clone(),
        cli.verbose,
        cli.no_color,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = resolve_config(&cli)?;

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("arag starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {} / model: {}", config.provider, config.model);

    config.validate()?;
    config.ensure_state_dir()?;

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Documents(cmd) => cmd.execute(&config).await,
        Commands::Retrieve(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::Eval(cmd) => cmd.execute(&config),
        Commands::Config(cmd) => cmd.execute(&config),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    Ok(result?)
}
