//! Summarization client: one non-streaming call to a chat-completion
//! endpoint with a fixed two-role prompt.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use crate::config::ConfigStore;
use crate::error::{PipelineError, PipelineResult};

const SYSTEM_PROMPT: &str = "You are a summarization assistant. Produce a structured, \
markdown-formatted summary of the content the user supplies. Start with a short \
**Overview** paragraph, then a **Key points** section as a bulleted list. Bold the \
important terms. Answer in the language of the content.";

/// Seam the pipeline uses; implemented by [`ChatSummarizer`] and by
/// test doubles.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, content: &str) -> PipelineResult<String>;
}

/// Credentials are re-read from the config store per call so edits made
/// over the API take effect without a restart.
pub struct ChatSummarizer {
    http: reqwest::Client,
    config: ConfigStore,
}

impl ChatSummarizer {
    pub fn new(config: ConfigStore) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    fn credentials(&self) -> PipelineResult<(String, String, String)> {
        let llm = self.config.load().map(|c| c.llm).unwrap_or_default();

        let require = |field: Option<String>, name: &str| {
            field.filter(|v| !v.is_empty()).ok_or_else(|| {
                PipelineError::Config(format!("LLM {} is not configured", name))
            })
        };

        Ok((
            require(llm.base_url, "base URL")?,
            require(llm.model, "model")?,
            require(llm.api_key, "API key")?,
        ))
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, content: &str) -> PipelineResult<String> {
        let (base_url, model, api_key) = self.credentials()?;

        let body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": content },
            ],
            "stream": false,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", base_url.trim_end_matches('/')))
            .bearer_auth(&api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Remote(format!("summarization call failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PipelineError::Remote(format!(
                "summarization endpoint returned {}: {}",
                status, text
            )));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            PipelineError::Remote(format!("summarization body invalid: {}", e))
        })?;
        let summary = parse_completion(&parsed)?;

        info!("Summarization complete: {} chars", summary.len());
        Ok(summary)
    }
}

/// Pull the first choice's message content out of a completion body.
pub fn parse_completion(body: &Value) -> PipelineResult<String> {
    let choices = body
        .get("choices")
        .and_then(Value::as_array)
        .filter(|c| !c.is_empty())
        .ok_or(PipelineError::EmptyResponse)?;

    let content = choices[0]
        .pointer("/message/content")
        .and_then(Value::as_str)
        .ok_or(PipelineError::EmptyResponse)?;

    Ok(content.trim().to_string())
}
