//! # RAG Harness CLI (`rag`)
//!
//! The `rag` binary builds a vector index from a document directory and
//! answers questions against it, from the command line or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag ingest` | Load, chunk, and embed the corpus; rebuild the index |
//! | `rag query "<question>"` | Answer one question |
//! | `rag serve` | Start the HTTP server |
//! | `rag stats` | Show what the index holds |
//! | `rag models` | List Gemini models usable for answering |
//!
//! ## Examples
//!
//! ```bash
//! # Preview what would be indexed
//! rag ingest --dry-run
//!
//! # Build the index
//! rag ingest --progress human
//!
//! # Ask a question and show the prompt sent to the model
//! rag query "What is the offside rule?" --show-prompt
//!
//! # Serve POST /query on [server].bind
//! rag serve
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).
//! Credentials (`GOOGLE_API_KEY`, `OPENAI_API_KEY`) may be placed in a `.env`
//! file in the working directory.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rag_harness::config;
use rag_harness::ingest::{self, IngestOptions};
use rag_harness::llm;
use rag_harness::progress::ProgressMode;
use rag_harness::query;
use rag_harness::server;
use rag_harness::stats;

/// RAG Harness: question answering grounded in a local document corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "RAG Harness: answer questions grounded in a local document corpus",
    version,
    long_about = "RAG Harness chunks and embeds a directory of documents into a persisted \
    vector index, then answers questions by retrieving the most relevant passages and asking \
    a language model to answer from them alone."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the vector index from the document directory.
    ///
    /// Loads every matching document, splits it into overlapping chunks,
    /// embeds the chunks, and atomically replaces the index. The previous
    /// index is kept if anything fails.
    Ingest {
        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Answer a single question.
    Query {
        /// The question.
        question: String,

        /// Print the retrieved chunks and rendered prompt before answering.
        #[arg(long)]
        show_prompt: bool,
    },

    /// Start the HTTP server.
    Serve,

    /// Show index statistics.
    Stats,

    /// List Gemini models that support content generation.
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { dry_run, progress } => {
            let opts = IngestOptions {
                dry_run,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            ingest::run_ingest(&cfg, opts).await?;
        }
        Commands::Query {
            question,
            show_prompt,
        } => {
            query::run_query(&cfg, &question, show_prompt).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Models => {
            llm::run_list_models(&cfg.model).await?;
        }
    }

    Ok(())
}
