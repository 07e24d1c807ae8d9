//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the LLM API key) are referenced by env-var name in the config
//! and resolved at runtime.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::fetch::ListingFilters;
use crate::types::{EntityKind, TrendError, Window};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub trending: TrendingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrendingConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Listing kinds to harvest: "repositories" and/or "developers".
    #[serde(default = "default_kinds")]
    pub kinds: Vec<String>,
    /// Ranking windows: "daily", "weekly", "monthly".
    #[serde(default = "default_windows")]
    pub windows: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub spoken_language_code: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Age after which a stored entity is re-augmented, and the delay
    /// between clean runs.
    #[serde(default = "default_refresh_hours")]
    pub refresh_interval_hours: u64,
    /// Delay before retrying after a degraded run.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI-compatible API base; defaults to api.openai.com.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Language summaries and tags are written in. Part of the entity key.
    #[serde(default = "default_summary_language")]
    pub summary_language: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_base_url() -> String {
    "https://github.com/trending".to_string()
}
fn default_kinds() -> Vec<String> {
    vec!["repositories".to_string()]
}
fn default_windows() -> Vec<String> {
    Window::ALL.iter().map(|w| w.as_str().to_string()).collect()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_refresh_hours() -> u64 {
    6
}
fn default_backoff_secs() -> u64 {
    60
}
fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_summary_language() -> String {
    "简体中文".to_string()
}
fn default_db_path() -> String {
    "github_trending.db".to_string()
}

impl Default for TrendingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            kinds: default_kinds(),
            windows: default_windows(),
            language: None,
            spoken_language_code: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_hours: default_refresh_hours(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_base: None,
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            summary_language: default_summary_language(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.windows()?.is_empty() {
            return Err(TrendError::Config("trending.windows must not be empty".into()).into());
        }
        if self.kinds()?.is_empty() {
            return Err(TrendError::Config("trending.kinds must not be empty".into()).into());
        }
        if self.scheduler.refresh_interval_hours == 0 {
            return Err(TrendError::Config("scheduler.refresh_interval_hours must be > 0".into()).into());
        }
        if self.scheduler.backoff_secs == 0 {
            return Err(TrendError::Config("scheduler.backoff_secs must be > 0".into()).into());
        }
        if self.llm.summary_language.trim().is_empty() {
            return Err(TrendError::Config("llm.summary_language must not be empty".into()).into());
        }
        Ok(())
    }

    /// Configured windows in order, duplicates removed.
    pub fn windows(&self) -> Result<Vec<Window>> {
        let mut out = Vec::new();
        for raw in &self.trending.windows {
            let window: Window = raw.parse()?;
            if !out.contains(&window) {
                out.push(window);
            }
        }
        Ok(out)
    }

    /// Configured listing kinds in order, duplicates removed.
    pub fn kinds(&self) -> Result<Vec<EntityKind>> {
        let mut out = Vec::new();
        for raw in &self.trending.kinds {
            let kind: EntityKind = raw.parse()?;
            if !out.contains(&kind) {
                out.push(kind);
            }
        }
        Ok(out)
    }

    pub fn filters(&self) -> ListingFilters {
        ListingFilters {
            language: self.trending.language.clone(),
            spoken_language_code: self.trending.spoken_language_code.clone(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.refresh_interval_hours * 3600)
    }

    pub fn backoff_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.backoff_secs)
    }

    /// The LLM API key, or an empty secret when the variable is unset.
    pub fn llm_api_key(&self) -> SecretString {
        SecretString::new(std::env::var(&self.llm.api_key_env).unwrap_or_default())
    }
}
