//! Anthropic-compatible messages client.
//!
//! The judge talks to whatever `ANTHROPIC_BASE_URL` points at, so a local
//! proxy or a stub server works the same as the hosted API.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Seam for the judge's single LLM operation. Production uses
/// [`HttpJudgeClient`]; tests script replies.
pub trait JudgeClient: Send + Sync {
    /// Sends one user prompt and returns the model's text reply.
    fn complete(&self, prompt: &str) -> Result<String>;
}

const DEFAULT_BASE_URL: &str = "http://localhost:8082";
const DEFAULT_MODEL: &str = "haiku";
const MAX_TOKENS: u32 = 4096;
/// Long transcripts can push a single reply past a minute.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct HttpJudgeClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct MessagesReply {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl HttpJudgeClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build judge HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Reads `ANTHROPIC_BASE_URL`, `ANTHROPIC_API_KEY`, and
    /// `AGRETRO_MODEL`, defaulting to a local proxy that needs no real
    /// key.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| "unused".to_string());
        let model = std::env::var("AGRETRO_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(&base_url, &api_key, &model)
    }
}

impl JudgeClient for HttpJudgeClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        });
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .context("send judge request")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            anyhow::bail!("judge endpoint returned {}: {}", status, detail.trim());
        }

        let reply: MessagesReply = response.json().context("decode judge reply")?;
        Ok(reply
            .content
            .first()
            .map(|block| block.text.trim().to_string())
            .unwrap_or_default())
    }
}
