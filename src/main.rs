//! # mailrag CLI
//!
//! The `mailrag` binary drives the email question-answering pipeline.
//!
//! ## Usage
//!
//! ```bash
//! mailrag --config ./config/mailrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mailrag init` | Create the SQLite database and run schema migrations |
//! | `mailrag import <file>` | Import a JSON mailbox export |
//! | `mailrag ask "<question>"` | Ask a question over the imported emails |
//! | `mailrag chunk <file>` | Show how a text file would be chunked |
//! | `mailrag serve` | Start the JSON HTTP API server |

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use mailrag::config;
use mailrag::progress::ProgressMode;
use mailrag::query::QueryService;

/// Thread-aware question answering over email archives.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/mailrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "mailrag",
    about = "Thread-aware question answering over email archives",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mailrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (emails, emails_fts, attachments, email_vectors).
    /// This command is idempotent.
    Init,

    /// Import a JSON mailbox export.
    ///
    /// Upserts emails, their FTS rows, and attachment text. When an
    /// embedding provider is configured, email content is chunked and
    /// embedded for vector reranking. Unchanged emails are skipped.
    Import {
        /// Path to the mailbox JSON file (an array of email records).
        file: PathBuf,

        /// Maximum number of records to import.
        #[arg(long)]
        limit: Option<usize>,

        /// Parse and report without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask a question over the imported emails.
    Ask {
        /// The question to answer.
        question: String,

        /// Number of threads to retrieve (overrides `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the full result as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,

        /// Skip vector reranking even if an embedding provider is configured.
        #[arg(long)]
        no_rerank: bool,

        /// Progress reporting on stderr.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Show how a text file would be chunked with the configured sizes.
    Chunk {
        /// Path to a UTF-8 text file.
        file: PathBuf,
    },

    /// Start the JSON HTTP API server.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = mailrag::db::connect(&cfg.db).await?;
            mailrag::migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import {
            file,
            limit,
            dry_run,
        } => {
            mailrag::import::run_import(&cfg, &file, dry_run, limit).await?;
        }
        Commands::Ask {
            question,
            top_k,
            json,
            no_rerank,
            progress,
        } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            let reporter = mode.reporter();

            let mut cfg = cfg;
            if no_rerank {
                cfg.retrieval.enable_rerank = false;
            }
            let service = QueryService::from_config(&cfg).await?;
            let result = service
                .query_with_progress(&question, top_k, reporter.as_ref())
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.answer);
                if !result.citations.is_empty() {
                    println!("\nSources:");
                    for c in &result.citations {
                        println!(
                            "  - {} — {} <{}> ({})",
                            c.subject,
                            c.sender,
                            c.sender_email,
                            c.received_time.format("%Y-%m-%d")
                        );
                    }
                }
            }
        }
        Commands::Chunk { file } => {
            let text = std::fs::read_to_string(&file)?;
            let chunker = mailrag::chunk::DocumentChunker::new(&cfg.chunking);
            let chunks = chunker.chunk_document(&text, &Default::default());
            println!("{} chunks:", chunks.len());
            for c in &chunks {
                println!(
                    "  [{}/{}] bytes {}..{} (~{} tokens)",
                    c.chunk_number, c.total_chunks, c.start_offset, c.end_offset, c.estimated_tokens
                );
            }
        }
        Commands::Serve => {
            mailrag::server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
