use anyhow::Result;
use sqlx::SqlitePool;

/// Create the email schema. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS emails (
            id TEXT PRIMARY KEY,
            conversation_id TEXT,
            subject TEXT NOT NULL DEFAULT '',
            sender_name TEXT NOT NULL DEFAULT '',
            sender_email TEXT NOT NULL DEFAULT '',
            received_time INTEGER NOT NULL,
            body TEXT NOT NULL DEFAULT '',
            dedup_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attachments (
            email_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            extracted_text TEXT NOT NULL DEFAULT '',
            text_length INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (email_id) REFERENCES emails(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS email_vectors (
            email_id TEXT NOT NULL,
            chunk_number INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (email_id, chunk_number),
            FOREIGN KEY (email_id) REFERENCES emails(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='emails_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE emails_fts USING fts5(
                email_id UNINDEXED,
                subject,
                body
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_emails_conversation_id ON emails(conversation_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_emails_received_time ON emails(received_time DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_attachments_email_id ON attachments(email_id)")
        .execute(pool)
        .await?;

    Ok(())
}
