//! # mailrag
//!
//! A thread-aware retrieval-augmented question answering core for email
//! archives. Emails are imported into SQLite with an FTS5 index, optionally
//! chunked and embedded for vector reranking, and queried through a
//! pipeline that understands conversation threads.
//!
//! ## Architecture
//!
//! ```text
//! question
//!   │  keyword extraction + query expansion      (keywords)
//!   ▼
//! FTS5 search ──► thread grouping ──► thread fetch + relevance gate
//!   │                (threads)             (query)
//!   ▼
//! optional vector rerank                        (embedding)
//!   ▼
//! thread-aware context + prompt                 (context)
//!   ▼
//! answer generation + citations                 (generate, citations)
//! ```
//!
//! ## Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`config`] | TOML configuration with validation |
//! | [`models`] | Shared data types |
//! | [`chunk`] | Boundary-aware document chunking |
//! | [`text`] | HTML cleaning and truncation |
//! | [`keywords`] | Keyword extraction and query expansion |
//! | [`threads`] | Thread grouping and relevance gating |
//! | [`context`] | Grounding-context and prompt assembly |
//! | [`citations`] | Citation extraction |
//! | [`query`] | The question-answering pipeline |
//! | [`traits`] | Collaborator interfaces |
//! | [`store`] | SQLite search and attachment access |
//! | [`embedding`] | Embedding client and vector reranking |
//! | [`generate`] | LLM answer generation |
//! | [`import`] | JSON mailbox import |
//! | [`server`] | JSON HTTP API |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! # async fn example() -> anyhow::Result<()> {
//! let config = mailrag::config::load_config("./config/mailrag.toml".as_ref())?;
//! let service = mailrag::query::QueryService::from_config(&config).await?;
//! let result = service.query("what did the client say about pricing?", None).await;
//! println!("{}", result.answer);
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod citations;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod generate;
pub mod import;
pub mod keywords;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod query;
pub mod server;
pub mod store;
pub mod text;
pub mod threads;
pub mod traits;
