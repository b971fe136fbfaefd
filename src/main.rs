//! # Ragline CLI
//!
//! The `ragline` binary manages the knowledge base and runs the server.
//!
//! ## Usage
//!
//! ```bash
//! ragline --config ./config/ragline.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragline init` | Create the SQLite database and run schema migrations |
//! | `ragline ingest <path>` | Ingest a file or directory into the knowledge base |
//! | `ragline query "<question>"` | Ask a one-shot question from the terminal |
//! | `ragline stats` | Show document/chunk/vector counts |
//! | `ragline serve` | Start the HTTP server (JSON API + channel webhooks) |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! ragline init --config ./config/ragline.toml
//!
//! # Ingest a docs directory
//! ragline ingest ./docs --config ./config/ragline.toml
//!
//! # Ask a question with sources printed
//! ragline query "what is the refund policy?" --config ./config/ragline.toml
//!
//! # Start the webhook server
//! ragline serve --config ./config/ragline.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ragline::config::{self, Config};
use ragline::db;
use ragline::embedding::create_embedder;
use ragline::engine::QueryEngine;
use ragline::generation::ChatCompletionsGenerator;
use ragline::ingest::{IngestOutcome, Ingestor};
use ragline::retrieve::Retriever;
use ragline::server;
use ragline::stats;
use ragline::store::sqlite::SqliteStore;
use ragline::store::KnowledgeStore;

/// Ragline — a retrieval-augmented knowledge-base assistant with voice,
/// SMS, WhatsApp, and chat channels.
#[derive(Parser)]
#[command(
    name = "ragline",
    about = "Ragline — a retrieval-augmented knowledge-base assistant",
    version,
    long_about = "Ragline ingests documents into a chunked, embedded knowledge base and \
    answers questions grounded in it, via the CLI, a JSON HTTP API, and webhook adapters \
    for voice calls, SMS, WhatsApp, and chat."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ragline.toml`. Database path, chunking,
    /// retrieval, embedding, generation, session, and channel settings
    /// are all read from this file.
    #[arg(long, global = true, default_value = "./config/ragline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, chunk_vectors). Idempotent.
    Init,

    /// Ingest a file or directory into the knowledge base.
    ///
    /// Supported file types: `.txt`, `.md`, `.markdown`, `.pdf`. For a
    /// directory, every supported file under it is ingested; unsupported
    /// files are skipped. Documents with content identical to an existing
    /// document are deduplicated.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,
    },

    /// Ask a one-shot question from the terminal.
    ///
    /// Retrieves relevant chunks, composes a grounded prompt, calls the
    /// generation backend, and prints the answer with its sources.
    Query {
        /// The question to ask.
        question: String,

        /// Print retrieved chunks and scores before the answer.
        #[arg(long)]
        show_context: bool,
    },

    /// Show knowledge-base statistics.
    Stats,

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves the JSON API plus the voice,
    /// SMS, WhatsApp, and chat webhooks.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ragline=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            db::run_migrations(&pool).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest { path } => {
            run_ingest(&cfg, &path).await?;
        }
        Commands::Query {
            question,
            show_context,
        } => {
            run_query(&cfg, &question, show_context).await?;
        }
        Commands::Stats => {
            run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> Result<Arc<dyn KnowledgeStore>> {
    let pool = db::connect(&cfg.db.path).await?;
    db::run_migrations(&pool).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

async fn run_ingest(cfg: &Config, path: &PathBuf) -> Result<()> {
    let store = open_store(cfg).await?;
    let embedder = create_embedder(&cfg.embedding)?;
    let ingestor = Ingestor::new(store, embedder, cfg.chunking.clone());

    if path.is_dir() {
        let report = ingestor.ingest_dir(path).await?;
        println!(
            "Ingested {} documents ({} duplicates skipped, {} unsupported files skipped)",
            report.ingested, report.duplicates, report.skipped
        );
        for (file, reason) in &report.failed {
            println!("  failed: {} — {}", file, reason);
        }
        if !report.failed.is_empty() {
            anyhow::bail!("{} files failed to ingest", report.failed.len());
        }
    } else {
        match ingestor.ingest_file(path).await? {
            IngestOutcome::Ingested {
                document_id,
                chunks,
            } => {
                println!("Ingested {} ({} chunks) as {}", path.display(), chunks, document_id);
            }
            IngestOutcome::Duplicate {
                existing_document_id,
            } => {
                println!(
                    "Skipped {} — identical content already stored as {}",
                    path.display(),
                    existing_document_id
                );
            }
        }
    }

    Ok(())
}

async fn run_query(cfg: &Config, question: &str, show_context: bool) -> Result<()> {
    let store = open_store(cfg).await?;
    let embedder = create_embedder(&cfg.embedding)?;
    let retriever = Retriever::new(store, embedder, cfg.retrieval.clone());
    let generator = Arc::new(ChatCompletionsGenerator::new(cfg.generation.clone()));
    let engine = QueryEngine::new(retriever, generator, cfg.prompt.clone());

    let answer = engine.answer(question, &[]).await?;

    if show_context {
        if answer.sources.is_empty() {
            println!("(no knowledge-base context cleared the relevance floor)");
        }
        for source in &answer.sources {
            println!(
                "[{:.3}] {} (chunk {})",
                source.score, source.source_name, source.chunk_id
            );
        }
        println!();
    }

    println!("{}", answer.text);

    if answer.grounded {
        println!("\nSources: {}", answer.source_names().join(", "));
    } else {
        println!("\n(answered from general knowledge — no matching documents)");
    }

    Ok(())
}

async fn run_stats(cfg: &Config) -> Result<()> {
    let store = open_store(cfg).await?;
    let embedder = create_embedder(&cfg.embedding)?;
    let stats = stats::gather(&store, None, embedder.model_name(), &cfg.generation.model).await?;

    println!("Documents: {}", stats.documents);
    println!("Chunks:    {}", stats.chunks);
    println!("Vectors:   {}", stats.vectors);
    println!("Embedding model:  {}", stats.embedding_model);
    println!("Generation model: {}", stats.generation_model);

    Ok(())
}
