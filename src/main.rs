//! # Portfolio Chat CLI (`pchat`)
//!
//! Serves the résumé question-answering API and exposes the index and
//! conversation stores for local inspection.
//!
//! ## Usage
//!
//! ```bash
//! pchat --config ./config/chat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pchat serve` | Prepare the index and start the HTTP server |
//! | `pchat index` | Rebuild the index if documents changed |
//! | `pchat ask <session> "<query>"` | Answer one question from the terminal |
//! | `pchat history <session>` | Print or clear a session's rolling history |
//! | `pchat status` | Show corpus, fingerprint, and index state |
//!
//! `REDIS_HOST`, `REDIS_PORT`, and `OPENAI_API_KEY` override the config file.
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use portfolio_chat::config::{self, Config};
use portfolio_chat::conversation::ConversationStore;
use portfolio_chat::embedding::create_embedder;
use portfolio_chat::indexer::Indexer;
use portfolio_chat::llm::create_chat_model;
use portfolio_chat::orchestrator::QueryOrchestrator;
use portfolio_chat::{server, store};

/// Portfolio Chat: answers questions about a résumé corpus as its author.
#[derive(Parser)]
#[command(
    name = "pchat",
    about = "Portfolio Chat: conversational question answering over a résumé corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare the index and start the HTTP server.
    ///
    /// Builds the index when it is missing or the documents changed, then
    /// binds to `[server].bind`.
    Serve,

    /// Check the documents for changes and rebuild the index if needed.
    Index {
        /// Rebuild even if the fingerprints match.
        #[arg(long)]
        force: bool,
    },

    /// Answer a single question, streaming the reply to stdout.
    Ask {
        /// Session identifier; also shown to the model as the asker's affiliation.
        session: String,

        /// The question.
        query: String,

        /// Wait for the full answer instead of streaming.
        #[arg(long)]
        no_stream: bool,
    },

    /// Print the rolling history of a session.
    History {
        session: String,

        /// Delete the session's history instead of printing it.
        #[arg(long)]
        clear: bool,
    },

    /// Show corpus, fingerprint, and index state.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let kv = store::open(&cfg.store)
        .await
        .with_context(|| format!("Failed to connect to store at {}", cfg.store.redis_url()))?;

    match cli.command {
        Commands::Serve => {
            let orchestrator = build_orchestrator(&cfg, kv).await?;
            server::run_server(&cfg.server.bind, Arc::new(orchestrator)).await?;
        }
        Commands::Index { force } => {
            let indexer = Indexer::new(&cfg, kv, create_embedder(&cfg.embedding)?);
            if force {
                let index = indexer.rebuild_all().await?;
                println!("Rebuilt index with {} chunks.", index.len());
            } else {
                match indexer.refresh().await? {
                    Some(index) => println!("Documents changed; rebuilt index with {} chunks.", index.len()),
                    None => println!("Documents unchanged; index is up to date."),
                }
            }
        }
        Commands::Ask {
            session,
            query,
            no_stream,
        } => {
            let orchestrator = build_orchestrator(&cfg, kv).await?;
            if no_stream {
                println!("{}", orchestrator.answer(&session, &query).await?);
            } else {
                let mut fragments = orchestrator.answer_stream(&session, &query).await?;
                let mut stdout = std::io::stdout();
                while let Some(fragment) = fragments.next().await {
                    write!(stdout, "{}", fragment?)?;
                    stdout.flush()?;
                }
                println!();
            }
        }
        Commands::History { session, clear } => {
            let conversations = ConversationStore::new(kv, &cfg.history);
            if clear {
                conversations.clear(&session).await?;
                println!("Cleared history for session '{}'.", session);
            } else {
                let history = conversations.recent(&session).await?;
                if history.is_empty() {
                    println!("No history for session '{}'.", session);
                }
                for (i, exchange) in history.iter().enumerate() {
                    println!("[{}] Q: {}", i + 1, exchange.question);
                    println!("    A: {}", exchange.answer);
                }
            }
        }
        Commands::Status => {
            let indexer = Indexer::new(&cfg, kv, create_embedder(&cfg.embedding)?);
            print_status(&cfg, &indexer).await?;
        }
    }

    Ok(())
}

async fn build_orchestrator(
    cfg: &Config,
    kv: Arc<dyn store::KvStore>,
) -> anyhow::Result<QueryOrchestrator> {
    let embedder = create_embedder(&cfg.embedding)?;
    let chat = create_chat_model(&cfg.llm)?;
    let orchestrator = QueryOrchestrator::bootstrap(cfg, kv, embedder, chat)
        .await
        .context("Failed to prepare the vector index")?;
    Ok(orchestrator)
}

async fn print_status(cfg: &Config, indexer: &Indexer) -> anyhow::Result<()> {
    let status = indexer.status().await?;

    println!("Corpus:        {}", cfg.corpus.dir.display());
    println!("Documents:     {}", status.documents);
    println!("Fingerprints:  {} stored", status.fingerprints_stored);
    println!(
        "Up to date:    {}",
        if status.up_to_date { "yes" } else { "no" }
    );
    println!("Index:         {}", cfg.index.path.display());
    match &status.index {
        Some(meta) => {
            println!("  model:       {}", meta.model);
            println!("  dims:        {}", meta.dims);
            println!("  chunks:      {}", meta.chunk_count);
            println!("  built at:    {}", meta.built_at.to_rfc3339());
            if status.model_mismatch() {
                println!(
                    "  warning:     built with '{}', configured model is '{}'; run `pchat index --force`",
                    meta.model, status.configured_model
                );
            }
        }
        None => println!("  (not built)"),
    }
    Ok(())
}
