//! OpenAI-compatible chat completions augmenter.
//!
//! Works against api.openai.com or any server exposing the same
//! `/chat/completions` endpoint (configured through `api_base`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::{parse_tags, prompts, strip_reasoning, Augmenter};
use crate::types::{TrendError, TrendingEntity};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_MAX_TOKENS: u32 = 512;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiAugmenter {
    http: Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
    max_tokens: u32,
    total_calls: AtomicU64,
}

impl OpenAiAugmenter {
    pub fn new(
        api_key: SecretString,
        api_base: Option<String>,
        model: Option<String>,
        max_tokens: Option<u32>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        let base = api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Ok(Self {
            http,
            api_key,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            total_calls: AtomicU64::new(0),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    fn error(&self, message: impl Into<String>) -> TrendError {
        TrendError::Augmentation {
            model: self.model.clone(),
            message: message.into(),
        }
    }

    /// Send one system + user exchange and return the completion text.
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(system.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(user.to_string()),
                },
            ],
        };

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let mut builder = self.http.post(&self.endpoint).json(&request);
            let key = self.api_key.expose_secret();
            if !key.is_empty() {
                builder = builder.bearer_auth(key);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse = response
                            .json()
                            .await
                            .context("Failed to parse chat completion response")?;
                        self.total_calls.fetch_add(1, Ordering::Relaxed);

                        let text = body
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message)
                            .and_then(|m| m.content)
                            .unwrap_or_default();
                        return Ok(text);
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(status = %status, attempt, model = %self.model, "Retryable completion error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }
                    return Err(self.error(format!("HTTP {status}: {error_text}")).into());
                }
                Err(e) => {
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        Err(self
            .error(format!(
                "failed after {MAX_RETRIES} retries: {}",
                last_error.unwrap_or_default()
            ))
            .into())
    }
}

#[async_trait]
impl Augmenter for OpenAiAugmenter {
    async fn summarize(&self, entity: &TrendingEntity, locale: &str) -> Result<String> {
        debug!(identity = %entity.identity, model = %self.model, "Requesting summary");
        let system = prompts::summary_system_prompt(locale);
        let user = prompts::summary_user_prompt(entity, locale);
        let text = self.complete(&system, &user).await?;

        let summary = strip_reasoning(&text);
        if summary.is_empty() {
            return Err(self.error("empty summary completion").into());
        }
        Ok(summary.to_string())
    }

    async fn tag(&self, entity: &TrendingEntity, locale: &str) -> Result<Vec<String>> {
        debug!(identity = %entity.identity, model = %self.model, "Requesting tags");
        let user = prompts::tags_user_prompt(entity, locale);
        let text = self.complete(prompts::tags_system_prompt(), &user).await?;
        Ok(parse_tags(&text))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
