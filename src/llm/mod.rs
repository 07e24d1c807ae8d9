//! LLM augmentation: summaries and tags for trending entities.
//!
//! Defines the `Augmenter` trait and the OpenAI-compatible
//! implementation, plus the response post-processing shared by any
//! chat-completions backend.

pub mod openai;
pub mod prompts;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{normalize_tags, TrendingEntity};

/// Abstraction over the summarization / tagging service.
///
/// Both calls may fail; callers treat a failure as "produced nothing".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Augmenter: Send + Sync {
    /// A one or two sentence feed-ready summary written in `locale`.
    async fn summarize(&self, entity: &TrendingEntity, locale: &str) -> Result<String>;

    /// Up to three short labels, ordered and deduplicated.
    async fn tag(&self, entity: &TrendingEntity, locale: &str) -> Result<Vec<String>>;
}

/// Drop a leading reasoning block (`<think>...</think>`) some models emit.
pub fn strip_reasoning(text: &str) -> &str {
    match text.rfind("</think>") {
        Some(idx) => text[idx + "</think>".len()..].trim(),
        None => text.trim(),
    }
}

/// Parse a comma separated tag completion. Accepts the full-width comma
/// and one tag list per line.
pub fn parse_tags(text: &str) -> Vec<String> {
    let body = strip_reasoning(text);
    let raw = body
        .lines()
        .flat_map(|line| line.split([',', '，']))
        .map(|t| t.trim().trim_matches('"'))
        .filter(|t| !t.is_empty());
    normalize_tags(raw)
}
