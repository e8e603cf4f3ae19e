//! Embedding client and vector reranking.
//!
//! [`embed_texts`] calls an OpenAI-compatible embeddings endpoint with
//! retry and backoff. [`OpenAiReranker`] implements [`QueryEmbedder`] on
//! top of it plus the `email_vectors` table, and [`create_reranker`]
//! decides at construction time whether reranking is available at all.
//!
//! Retry strategy for the HTTP call:
//! - HTTP 429 (rate limited) and 5xx (server error): retry
//! - HTTP 4xx (client error, not 429): fail immediately
//! - Network errors: retry
//! - Backoff doubles per attempt, capped at 32s

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::time::Duration;

use crate::config::{Config, EmbeddingConfig};
use crate::models::RankedEmail;
use crate::traits::{QueryEmbedder, Reranker};

/// Embed a batch of texts, returning one vector per input in order.
pub async fn embed_texts(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if !config.is_enabled() {
        bail!("embedding provider is disabled");
    }

    let api_key = std::env::var(&config.api_key_env)
        .with_context(|| format!("{} not set", config.api_key_env))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(&config.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_embeddings_response(&json);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "embeddings API error {}: {}",
                        status,
                        body_text
                    ));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("embeddings API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding failed after retries")))
}

fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("invalid embeddings response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("invalid embeddings response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Vector reranker backed by the embeddings API and stored chunk vectors.
///
/// An email may have several chunk vectors; its score is the best cosine
/// similarity among them, so one strong passage is enough to surface a
/// long email.
pub struct OpenAiReranker {
    config: EmbeddingConfig,
    pool: SqlitePool,
}

impl OpenAiReranker {
    pub fn new(config: EmbeddingConfig, pool: SqlitePool) -> Self {
        Self { config, pool }
    }

    async fn email_vectors(&self, email_id: &str) -> Result<Vec<Vec<f32>>> {
        let rows = sqlx::query("SELECT embedding FROM email_vectors WHERE email_id = ?")
            .bind(email_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                blob_to_vec(&blob)
            })
            .collect())
    }
}

#[async_trait]
impl QueryEmbedder for OpenAiReranker {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = embed_texts(&self.config, &[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty embedding response"))
    }

    async fn rerank(
        &self,
        query_vector: &[f32],
        candidate_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<RankedEmail>> {
        let mut scored: Vec<RankedEmail> = Vec::new();

        for id in candidate_ids {
            // Candidates imported before embeddings were enabled simply
            // have no vectors; skip them instead of failing the rerank.
            let vectors = match self.email_vectors(id).await {
                Ok(v) => v,
                Err(_) => continue,
            };
            if vectors.is_empty() {
                continue;
            }

            let best = vectors
                .iter()
                .map(|v| cosine_similarity(query_vector, v))
                .fold(f32::MIN, f32::max);

            scored.push(RankedEmail {
                id: id.clone(),
                similarity: best,
            });
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Decide the reranking capability from configuration.
///
/// Reranking requires both `retrieval.enable_rerank` and a configured
/// embedding provider; anything less means [`Reranker::Disabled`].
pub fn create_reranker(config: &Config, pool: SqlitePool) -> Reranker {
    if config.retrieval.enable_rerank && config.embedding.is_enabled() {
        Reranker::Embedding(Box::new(OpenAiReranker::new(
            config.embedding.clone(),
            pool,
        )))
    } else {
        Reranker::Disabled
    }
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
