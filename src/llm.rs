//! Resilient client for an OpenAI-compatible chat completion endpoint.
//!
//! Every failure mode collapses to "no text": rate limiting is retried a
//! fixed number of times with a fixed delay, any other failure returns
//! `None` immediately. Callers decide what a missing answer means.

use crate::error::{DigestError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Attempts made before a rate-limited request gives up
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fixed wait between rate-limited attempts
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(200);

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Path appended to the configured base URL
const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_retries: u32,
    pub retry_wait: Duration,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_wait: DEFAULT_RETRY_WAIT,
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), COMPLETIONS_PATH)
    }
}

/// Role-tagged chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Anything that turns a conversation into free text.
///
/// `None` means the backend produced no usable answer.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Option<String>;
}

/// Chat completion client with bounded retry on HTTP 429.
///
/// Holds no per-call state, so one instance can be shared by every
/// concurrent extraction.
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    endpoint: String,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.max_retries == 0 {
            return Err(DigestError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DigestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let endpoint = config.endpoint();
        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// One round trip. `Ok(None)` when the body is not the expected shape.
    async fn request(&self, body: &serde_json::Value, attempt: u32) -> Result<Option<String>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DigestError::RateLimited(attempt));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DigestError::Api {
                code: status.as_u16() as i32,
                message: format!("LLM API error: {} - {}", status, error_text),
            });
        }

        match response.json::<serde_json::Value>().await {
            Ok(value) => Ok(extract_content(&value)),
            Err(e) => {
                debug!(error = %e, "LLM response body is not JSON");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Option<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "apiKey": self.config.api_key,
            "messages": messages,
            "temperature": 0.0
        });

        for attempt in 1..=self.config.max_retries {
            match self.request(&body, attempt).await {
                Ok(content) => {
                    if content.is_none() {
                        warn!(attempt, "LLM response has no choices[0].message.content");
                    }
                    return content;
                }
                Err(DigestError::RateLimited(_)) => {
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        wait_ms = self.config.retry_wait.as_millis() as u64,
                        "Rate limited by LLM backend"
                    );
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(self.config.retry_wait).await;
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "LLM request failed");
                    return None;
                }
            }
        }

        warn!(
            max_retries = self.config.max_retries,
            "Retry budget exhausted, giving up"
        );
        None
    }
}

/// Pull `choices[0].message.content` out of a completion body.
pub fn extract_content(value: &serde_json::Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}
