// src/main.rs
// CLI entry point: `claude-memory serve|decay|health`.
//
// Per-command log level selection, a fixed home-directory `.env` path
// loaded instead of CWD so a malicious repo can't override API keys, and a
// server initialization order of config -> store -> embeddings ->
// `ToolContext` -> transport loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use memory_core::chunking::HeuristicChunking;
use memory_core::config::EngineConfig;
use memory_core::decay::DecayScheduler;
use memory_core::dispatch::ToolContext;
use memory_core::embeddings::{Embeddings, NoopEmbeddings, OpenAiEmbeddings};
use memory_core::mcp::MemoryServer;
use memory_core::store::sqlite::SqliteStore;
use memory_core::store::VectorStore;

#[derive(Parser)]
#[command(name = "claude-memory", version, about = "Conversational memory MCP server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server over stdio (default).
    Serve,
    /// Decay scheduler operations.
    Decay {
        #[command(subcommand)]
        action: DecayAction,
    },
    /// Print a one-shot health report for a repository.
    Health {
        repository: String,
    },
}

#[derive(Subcommand)]
enum DecayAction {
    /// Run one retention sweep immediately and exit.
    RunOnce,
}

fn init_logging(command: &Option<Commands>) {
    // Quiet by default: MCP stdio must stay clean for JSON-RPC framing, and
    // all our logging goes to stderr regardless, but WARN keeps noise down
    // for interactive `decay`/`health` runs too.
    let level = match command {
        None | Some(Commands::Serve) => Level::WARN,
        Some(Commands::Decay { .. }) => Level::INFO,
        Some(Commands::Health { .. }) => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn build_store(config: &EngineConfig) -> Result<Arc<dyn VectorStore>> {
    let store = SqliteStore::open(&config.db_path, config.embeddings_dimensions)?;
    Ok(Arc::new(store))
}

fn build_embeddings(config: &EngineConfig) -> Arc<dyn Embeddings> {
    match (&config.embeddings_url, &config.embeddings_api_key) {
        (Some(url), Some(key)) => Arc::new(OpenAiEmbeddings::new(
            url.clone(),
            key.clone(),
            config.embeddings_model.clone(),
            config.embeddings_dimensions,
        )),
        _ => Arc::new(NoopEmbeddings::new(config.embeddings_dimensions)),
    }
}

async fn build_context(config: EngineConfig) -> Result<Arc<ToolContext>> {
    let store = build_store(&config)?;
    store.initialize().await?;
    let embeddings = build_embeddings(&config);
    let chunking = Arc::new(HeuristicChunking);
    Ok(Arc::new(ToolContext::new(store, embeddings, chunking, config)))
}

async fn run_serve() -> Result<()> {
    let ctx = build_context(EngineConfig::from_env()).await?;

    let decay_handle = ctx.decay.clone();
    let cancel = CancellationToken::new();
    let decay_cancel = cancel.clone();
    tokio::spawn(async move { decay_handle.run(decay_cancel).await });

    let server = MemoryServer::new(ctx);
    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(server, transport).await?;
    service.waiting().await?;
    cancel.cancel();
    Ok(())
}

async fn run_decay_once() -> Result<()> {
    let ctx = build_context(EngineConfig::from_env()).await?;
    let deleted = ctx.decay.tick_once().await?;
    println!("{{\"deleted\": {deleted}}}");
    Ok(())
}

async fn run_health(repository: String) -> Result<()> {
    let ctx = build_context(EngineConfig::from_env()).await?;
    let records = ctx.store.get_all_chunks(Some(&repository)).await?;
    let report = memory_core::analytics::AnalyticsEngine::health(&records);
    println!(
        "{{\"repository\": \"{repository}\", \"score\": {:.3}, \"band\": \"{:?}\"}}",
        report.score, report.band
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env from a fixed home-directory path only — never from CWD, so a
    // malicious repo can't override the embeddings API key.
    if let Some(home) = dirs_home() {
        let _ = dotenvy::from_path(home.join(".claude-memory/.env"));
    }

    let cli = Cli::parse();
    init_logging(&cli.command);

    match cli.command {
        None | Some(Commands::Serve) => run_serve().await,
        Some(Commands::Decay {
            action: DecayAction::RunOnce,
        }) => run_decay_once().await,
        Some(Commands::Health { repository }) => run_health(repository).await,
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
