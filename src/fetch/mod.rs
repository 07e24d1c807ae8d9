//! Markup fetching.
//!
//! Defines the `TrendingSource` trait the orchestrator pulls raw pages
//! through, the request description for a listing, and the reqwest
//! implementation used in production.

pub mod http;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{EntityKind, Window};

/// Abstraction over the web request layer.
///
/// Implementors return the page body as text. Any error (connection
/// failure, non-success status, undecodable body) is surfaced as `Err`;
/// the orchestrator treats it as an empty listing.
#[async_trait]
pub trait TrendingSource: Send + Sync {
    async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<String>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// Where and how to request one listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
}

/// Filters applied to every listing request.
#[derive(Debug, Clone, Default)]
pub struct ListingFilters {
    /// Programming-language path segment, e.g. `rust` or `c++`.
    pub language: Option<String>,
    /// Spoken-language code (repositories only), e.g. `en`.
    pub spoken_language_code: Option<String>,
}

impl ListingRequest {
    /// Build the request for `kind` over `window`:
    /// `base[/developers][/<language>]?since=<window>[&spoken_language_code=..]`.
    pub fn new(base_url: &str, kind: EntityKind, window: Window, filters: &ListingFilters) -> Self {
        let mut url = base_url.trim_end_matches('/').to_string();
        if kind == EntityKind::Developer {
            url.push_str("/developers");
        }
        if let Some(lang) = filters.language.as_deref().filter(|l| !l.is_empty()) {
            url.push('/');
            url.push_str(&urlencoding::encode(lang));
        }

        let mut params = vec![("since".to_string(), window.as_str().to_string())];
        if kind == EntityKind::Repository {
            if let Some(code) = filters.spoken_language_code.as_deref().filter(|c| !c.is_empty()) {
                params.push(("spoken_language_code".to_string(), code.to_string()));
            }
        }

        Self { url, params }
    }
}
