//! Completion API integration.
//!
//! A thin, rate-limited client for a remote text-completion endpoint. The
//! vendor answers in one of two shapes (a `completion_message` object or a
//! `choices` list); parsing tries both and fails with a named error when
//! neither matches. No retry on transient failure — callers decide.

pub mod rate_limit;

pub use rate_limit::RateLimiter;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::LlmError;

/// Requests admitted per rate-limit window.
const RATE_LIMIT_MAX_REQUESTS: usize = 50;

/// Rate-limit window length.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(1);

/// Sampling temperature — deterministic-leaning for classification work.
const TEMPERATURE: f32 = 0.1;

/// Seam for everything that asks the model a question.
///
/// The pipeline, detail extractor, and call summarizer all depend on this
/// trait so tests can substitute canned responses.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send `prompt` as a single system message, return the completion text.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError>;
}

/// Rate-limited client for the Llama completion endpoint.
pub struct LlamaClient {
    http: reqwest::Client,
    api_url: String,
    api_key: SecretString,
    model: String,
    limiter: RateLimiter,
}

impl LlamaClient {
    /// Create a client with the default request limit (50/s).
    pub fn new(
        http: reqwest::Client,
        api_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        token_budget: Option<u64>,
    ) -> Self {
        let mut limiter = RateLimiter::new(RATE_LIMIT_MAX_REQUESTS, RATE_LIMIT_WINDOW);
        if let Some(budget) = token_budget {
            limiter = limiter.with_token_budget(budget);
        }
        Self {
            http,
            api_url: api_url.into(),
            api_key,
            model: model.into(),
            limiter,
        }
    }
}

#[async_trait]
impl CompletionProvider for LlamaClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        self.limiter.admit(u64::from(max_tokens)).await;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "system", "content": prompt}],
            "temperature": TEMPERATURE,
            "max_tokens": max_tokens,
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), %body, "Completion API error");
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        completion_text(&raw)
    }
}

// ── Response parsing ────────────────────────────────────────────────

/// The two response shapes the vendor is known to return.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CompletionPayload {
    Message { completion_message: CompletionMessage },
    Choices { choices: Vec<Choice> },
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    text: String,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Resolve the completion text from either known response shape.
fn completion_text(raw: &serde_json::Value) -> Result<String, LlmError> {
    let payload: CompletionPayload = serde_json::from_value(raw.clone()).map_err(|_| {
        tracing::error!(response = %raw, "Unexpected completion API response format");
        LlmError::UnrecognizedResponse
    })?;

    match payload {
        CompletionPayload::Message { completion_message } => {
            Ok(completion_message.content.text.trim().to_string())
        }
        CompletionPayload::Choices { choices } => choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or(LlmError::UnrecognizedResponse),
    }
}
