//! JSON mailbox import.
//!
//! Reads an exported mailbox (a JSON array of email records), upserts
//! each email plus its FTS row and attachments, and, when an embedding
//! provider is configured, chunks and embeds the content into
//! `email_vectors`. Embedding failures are non-fatal; the emails stay
//! searchable by FTS and can be embedded on a later run.

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;

use crate::chunk::DocumentChunker;
use crate::config::Config;
use crate::db;
use crate::embedding::{embed_texts, vec_to_blob};
use crate::text::clean_html;

#[derive(Debug, Deserialize)]
pub struct MailboxRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_email: String,
    /// Unix seconds.
    pub received_time: i64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentRecord {
    pub filename: String,
    #[serde(default)]
    pub extracted_text: String,
}

/// Per-record import outcome.
enum Outcome {
    Imported { embed_pending: bool },
    Skipped,
    Failed(String),
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Emails stored without vectors while embeddings were enabled.
    pub embed_pending: usize,
    pub errors: Vec<String>,
}

/// Import a mailbox JSON file.
///
/// `dry_run` parses and reports without touching the database; `limit`
/// caps the number of records considered.
pub async fn run_import(
    config: &Config,
    path: &Path,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<ImportReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mailbox file: {}", path.display()))?;
    let mut records: Vec<MailboxRecord> =
        serde_json::from_str(&content).context("Failed to parse mailbox JSON")?;

    if let Some(limit) = limit {
        records.truncate(limit);
    }

    if dry_run {
        println!("dry run: {} records parsed from {}", records.len(), path.display());
        return Ok(ImportReport::default());
    }

    let pool = db::connect(&config.db).await?;
    crate::migrate::run_migrations(&pool).await?;

    let chunker = DocumentChunker::new(&config.chunking);
    let mut outcomes = Vec::with_capacity(records.len());
    for record in &records {
        outcomes.push(import_one(config, &pool, &chunker, record).await);
    }

    let report = outcomes
        .into_iter()
        .fold(ImportReport::default(), |mut report, outcome| {
            match outcome {
                Outcome::Imported { embed_pending } => {
                    report.imported += 1;
                    if embed_pending {
                        report.embed_pending += 1;
                    }
                }
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed(err) => {
                    report.failed += 1;
                    report.errors.push(err);
                }
            }
            report
        });

    println!(
        "Imported {} emails ({} skipped, {} failed)",
        report.imported, report.skipped, report.failed
    );
    if report.embed_pending > 0 {
        println!(
            "  {} emails stored without vectors (embedding errors)",
            report.embed_pending
        );
    }
    for err in &report.errors {
        eprintln!("  error: {}", err);
    }

    Ok(report)
}

async fn import_one(
    config: &Config,
    pool: &SqlitePool,
    chunker: &DocumentChunker,
    record: &MailboxRecord,
) -> Outcome {
    let id = record
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    match store_email(config, pool, chunker, record, &id).await {
        Ok(outcome) => outcome,
        Err(e) => Outcome::Failed(format!("{}: {:#}", id, e)),
    }
}

async fn store_email(
    config: &Config,
    pool: &SqlitePool,
    chunker: &DocumentChunker,
    record: &MailboxRecord,
    id: &str,
) -> Result<Outcome> {
    let dedup_hash = content_hash(record);

    let existing: Option<String> =
        sqlx::query_scalar("SELECT dedup_hash FROM emails WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    if existing.as_deref() == Some(dedup_hash.as_str()) {
        return Ok(Outcome::Skipped);
    }

    let mut tx = pool.begin().await?;

    // Replace, don't merge. A re-imported email drops its old FTS row,
    // attachments, and vectors.
    sqlx::query("DELETE FROM emails_fts WHERE email_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM attachments WHERE email_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM email_vectors WHERE email_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM emails WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO emails (id, conversation_id, subject, sender_name,
                            sender_email, received_time, body, dedup_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&record.conversation_id)
    .bind(&record.subject)
    .bind(&record.sender_name)
    .bind(&record.sender_email)
    .bind(record.received_time)
    .bind(&record.body)
    .bind(&dedup_hash)
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO emails_fts (email_id, subject, body) VALUES (?, ?, ?)")
        .bind(id)
        .bind(&record.subject)
        .bind(clean_html(&record.body))
        .execute(&mut *tx)
        .await?;

    for att in &record.attachments {
        sqlx::query(
            "INSERT INTO attachments (email_id, filename, extracted_text, text_length)
             VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&att.filename)
        .bind(&att.extracted_text)
        .bind(att.extracted_text.len() as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    if !config.embedding.is_enabled() {
        return Ok(Outcome::Imported {
            embed_pending: false,
        });
    }

    match embed_email(config, pool, chunker, record, id).await {
        Ok(()) => Ok(Outcome::Imported {
            embed_pending: false,
        }),
        Err(_) => Ok(Outcome::Imported { embed_pending: true }),
    }
}

async fn embed_email(
    config: &Config,
    pool: &SqlitePool,
    chunker: &DocumentChunker,
    record: &MailboxRecord,
    id: &str,
) -> Result<()> {
    let content = embedding_content(record);

    let texts: Vec<String> = if chunker.should_chunk(&content) {
        let mut metadata = BTreeMap::new();
        metadata.insert("email_id".to_string(), id.to_string());
        chunker
            .chunk_document(&content, &metadata)
            .into_iter()
            .map(|c| c.text)
            .collect()
    } else {
        vec![content]
    };

    let vectors = embed_texts(&config.embedding, &texts).await?;

    for (n, vector) in vectors.iter().enumerate() {
        sqlx::query(
            "INSERT OR REPLACE INTO email_vectors (email_id, chunk_number, embedding)
             VALUES (?, ?, ?)",
        )
        .bind(id)
        .bind(n as i64)
        .bind(vec_to_blob(vector))
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Text handed to the embedder: headers give the vectors sender and
/// subject signal that the body alone lacks.
fn embedding_content(record: &MailboxRecord) -> String {
    format!(
        "Subject: {}\nFrom: {} <{}>\n\n{}",
        record.subject,
        record.sender_name,
        record.sender_email,
        clean_html(&record.body)
    )
}

fn content_hash(record: &MailboxRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.subject.as_bytes());
    hasher.update(b"\x00");
    hasher.update(record.sender_email.as_bytes());
    hasher.update(b"\x00");
    hasher.update(record.received_time.to_le_bytes());
    hasher.update(b"\x00");
    hasher.update(record.body.as_bytes());
    format!("{:x}", hasher.finalize())
}
