//! Core data models used throughout mailrag.
//!
//! These types represent the emails, chunks, citations, and query responses
//! that flow through the retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rank assigned to search hits that carry no rank of their own.
///
/// FTS rank is ascending (lower = more relevant), so unknown ranks sort last.
pub const UNRANKED: f64 = 999_999.0;

fn default_rank() -> f64 {
    UNRANKED
}

/// An email as returned by the search store.
///
/// The retrieval core treats this as read-only input; it is owned by the
/// [`Searcher`](crate::traits::Searcher) collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: String,
    /// Conversation (thread) identifier. Absent for standalone messages.
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_email: String,
    pub received_time: DateTime<Utc>,
    /// Raw body, possibly HTML.
    #[serde(default)]
    pub body: String,
    /// Search rank, ascending = more relevant.
    #[serde(default = "default_rank")]
    pub rank: f64,
}

impl EmailRecord {
    /// Conversation id, treating the empty string as absent.
    pub fn conversation(&self) -> Option<&str> {
        self.conversation_id.as_deref().filter(|c| !c.is_empty())
    }

    /// Key under which this email is grouped into a thread: the conversation
    /// id when present, otherwise the email's own id (singleton thread).
    pub fn thread_key(&self) -> &str {
        self.conversation().unwrap_or(&self.id)
    }
}

/// A bounded text segment produced for embedding, with position and overlap
/// metadata. Created in one call to the chunker and immutable thereafter.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub chunk_number: usize,
    pub total_chunks: usize,
    pub text: String,
    /// Byte offset into the original (untrimmed) text.
    pub start_offset: usize,
    pub end_offset: usize,
    pub estimated_tokens: usize,
    pub metadata: BTreeMap<String, String>,
}

/// Extracted text of one attachment, as returned by the attachment store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentText {
    pub filename: String,
    pub text: String,
}

/// Per-thread metadata recorded while selecting threads, used when
/// rendering the grounding context.
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    /// Number of relevant messages kept from this thread.
    pub count: usize,
    pub subject: String,
}

/// A structured citation pointing at one retrieved email.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub sender_email: String,
    pub received_time: DateTime<Utc>,
    /// HTML-stripped body excerpt, at most 200 chars plus an ellipsis.
    pub snippet: String,
}

/// The final response for one question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Whether any usable emails were found, independent of whether the
    /// answer generation call itself succeeded.
    pub success: bool,
    pub answer: String,
    pub citations: Vec<Citation>,
    /// More emails than the answer actually cites, for UI drill-down.
    pub retrieved_emails: Vec<EmailRecord>,
}

/// One entry of a rerank result: an email id with its cosine similarity
/// to the query embedding.
#[derive(Debug, Clone)]
pub struct RankedEmail {
    pub id: String,
    pub similarity: f32,
}
