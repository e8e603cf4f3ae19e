//! Answer generation over an OpenAI-compatible chat completions API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::traits::{AnswerGenerator, GeneratedAnswer};

/// Chat-completions-backed generator.
pub struct HttpAnswerGenerator {
    config: GenerationConfig,
    model: String,
}

impl HttpAnswerGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required"))?;
        Ok(Self {
            config: config.clone(),
            model,
        })
    }
}

#[async_trait]
impl AnswerGenerator for HttpAnswerGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedAnswer> {
        let api_key = std::env::var(&self.config.api_key_env)
            .with_context(|| format!("{} not set", self.config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let response = client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat completions API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let answer = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("invalid chat completions response: missing content"))?
            .trim()
            .to_string();

        Ok(GeneratedAnswer {
            answer,
            citations: Vec::new(),
        })
    }
}

/// Generator used when no provider is configured. Failing here lets the
/// pipeline degrade to a search-only result instead of aborting.
pub struct DisabledGenerator;

#[async_trait]
impl AnswerGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedAnswer> {
        bail!("generation provider is disabled")
    }
}

pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "openai" => Ok(Box::new(HttpAnswerGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
