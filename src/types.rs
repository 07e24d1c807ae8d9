//! Shared types for the TRENDFEED harvester.
//!
//! These types form the data model used across all modules: the
//! extraction engine produces them, the store persists them and the
//! orchestrator moves them between the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of tags retained per entity.
pub const MAX_TAGS: usize = 3;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// A named ranking period. Each window is an independent ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Daily,
    Weekly,
    Monthly,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Daily, Window::Weekly, Window::Monthly];

    /// Value used for the `since` query parameter and the store column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Daily => "daily",
            Window::Weekly => "weekly",
            Window::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Window {
    type Err = TrendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(Window::Daily),
            "weekly" | "week" => Ok(Window::Weekly),
            "monthly" | "month" => Ok(Window::Monthly),
            _ => Err(TrendError::InvalidWindow(s.to_string())),
        }
    }
}

/// Which trending listing an entity was harvested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Repository,
    Developer,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Repository => "repository",
            EntityKind::Developer => "developer",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = TrendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "repository" | "repositories" | "repo" | "repos" => Ok(EntityKind::Repository),
            "developer" | "developers" | "dev" | "devs" => Ok(EntityKind::Developer),
            _ => Err(TrendError::InvalidKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// One entry of a repository's "built by" sub-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub username: String,
    pub url: String,
    pub avatar_url: Option<String>,
}

/// A trending developer's highlighted repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularRepo {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
}

/// One harvested item (repository or developer).
///
/// The extraction engine fills the markup-derived fields. `window`,
/// `summary_locale` and the timestamps are stamped by the orchestrator;
/// `summary` and `tags` come from the augmentation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingEntity {
    pub kind: EntityKind,
    /// 1-based position within the ranking window.
    pub rank: u32,
    /// `owner/name` for repositories, `username` for developers.
    pub identity: String,
    pub url: String,

    pub owner: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub language_color: Option<String>,
    /// Total stars.
    pub total_count: Option<u64>,
    /// Forks.
    pub secondary_count: Option<u64>,
    /// Stars gained within the window.
    pub window_delta: Option<u64>,
    pub contributors: Vec<Contributor>,

    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub popular_repo: Option<PopularRepo>,

    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub summary_locale: Option<String>,
    pub window: Option<Window>,
    pub created_at: Option<DateTime<Utc>>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl TrendingEntity {
    /// A bare entity carrying only the mandatory fields.
    pub fn new(kind: EntityKind, rank: u32, identity: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind,
            rank,
            identity: identity.into(),
            url: url.into(),
            owner: None,
            name: None,
            description: None,
            language: None,
            language_color: None,
            total_count: None,
            secondary_count: None,
            window_delta: None,
            contributors: Vec::new(),
            display_name: None,
            avatar_url: None,
            popular_repo: None,
            summary: None,
            tags: Vec::new(),
            summary_locale: None,
            window: None,
            created_at: None,
            refreshed_at: None,
        }
    }

    /// Whether both augmentation outputs are present and non-empty.
    pub fn is_augmented(&self) -> bool {
        self.summary.is_some() && !self.tags.is_empty()
    }

    /// The markup-derived fields handed to the augmentation prompts.
    pub fn prompt_payload(&self) -> serde_json::Value {
        match self.kind {
            EntityKind::Repository => serde_json::json!({
                "username": self.owner,
                "repository_name": self.name,
                "url": self.url,
                "description": self.description,
                "language": self.language,
                "total_stars": self.total_count,
                "forks": self.secondary_count,
                "stars_since": self.window_delta,
            }),
            EntityKind::Developer => serde_json::json!({
                "username": self.identity,
                "name": self.display_name,
                "url": self.url,
                "popular_repo_name": self.popular_repo.as_ref().map(|r| &r.name),
                "popular_repo_description": self
                    .popular_repo
                    .as_ref()
                    .and_then(|r| r.description.as_ref()),
            }),
        }
    }

    /// Test fixture: a fully populated repository entity.
    #[cfg(test)]
    pub fn sample(rank: u32, owner: &str, name: &str) -> Self {
        let mut e = Self::new(
            EntityKind::Repository,
            rank,
            format!("{owner}/{name}"),
            format!("https://github.com/{owner}/{name}"),
        );
        e.owner = Some(owner.to_string());
        e.name = Some(name.to_string());
        e.description = Some("A sample repository".to_string());
        e.language = Some("Rust".to_string());
        e.language_color = Some("#dea584".to_string());
        e.total_count = Some(1200);
        e.secondary_count = Some(80);
        e.window_delta = Some(150);
        e
    }
}

impl fmt::Display for TrendingEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} [{}]", self.rank, self.identity, self.kind)?;
        if let Some(window) = self.window {
            write!(f, " ({window})")?;
        }
        Ok(())
    }
}

/// Natural key of a stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub identity: String,
    pub window: Window,
    pub locale: String,
}

/// An entity as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub id: i64,
    pub entity: TrendingEntity,
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Trim, drop empties, deduplicate (exact match, first occurrence wins)
/// and keep at most [`MAX_TAGS`].
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::with_capacity(MAX_TAGS);
    for tag in tags {
        let tag = tag.as_ref().trim();
        if tag.is_empty() || out.iter().any(|t| t == tag) {
            continue;
        }
        out.push(tag.to_string());
        if out.len() == MAX_TAGS {
            break;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for TRENDFEED.
#[derive(Debug, thiserror::Error)]
pub enum TrendError {
    #[error("Fetch error ({url}): {message}")]
    Fetch { url: String, message: String },

    #[error("Augmentation error ({model}): {message}")]
    Augmentation { model: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown ranking window: {0}")]
    InvalidWindow(String),

    #[error("Unknown listing kind: {0}")]
    InvalidKind(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
