//! Collaborator interfaces for the query pipeline.
//!
//! The orchestrator in [`crate::query`] is written against these traits so
//! tests can drive it with in-memory fakes and so the SQLite, HTTP, and
//! embedding backends stay swappable.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{AttachmentText, EmailRecord, RankedEmail};

/// Full-text search over the email store.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Run a boolean FTS query, returning up to `limit` ranked hits
    /// (ascending rank = better match).
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<EmailRecord>>;

    /// Fetch every email in a conversation, oldest first.
    async fn thread_emails(&self, conversation_id: &str) -> Result<Vec<EmailRecord>>;
}

/// Access to extracted attachment text.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Non-empty extracted attachment texts for one email, longest first.
    async fn extracted_text(&self, email_id: &str) -> Result<Vec<AttachmentText>>;
}

/// A generated answer plus any structured citations the model emitted.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<serde_json::Value>,
}

/// LLM answer generation from a grounded prompt.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedAnswer>;
}

/// Query-side embedding and vector reranking.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    /// Embed the raw question text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Rank the candidate email ids by similarity to `query_vector`,
    /// best first, truncated to `top_k`. Ids without stored vectors are
    /// skipped rather than failing the whole rerank.
    async fn rerank(
        &self,
        query_vector: &[f32],
        candidate_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<RankedEmail>>;
}

/// Reranking capability, decided once at construction time.
///
/// Carrying the capability in the type means the pipeline never has to
/// re-check configuration flags mid-query.
pub enum Reranker {
    /// No reranking; lexical rank order stands.
    Disabled,
    /// Vector rerank backed by an embedding provider.
    Embedding(Box<dyn QueryEmbedder>),
}
