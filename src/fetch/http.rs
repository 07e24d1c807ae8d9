//! reqwest-backed `TrendingSource`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::TrendingSource;
use crate::types::TrendError;

const SOURCE_NAME: &str = "http";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("trendfeed/", env!("CARGO_PKG_VERSION"));

pub struct HttpSource {
    http: Client,
}

impl HttpSource {
    pub fn new(timeout_secs: Option<u64>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build trending HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TrendingSource for HttpSource {
    async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<String> {
        debug!(url, ?params, "Fetching listing");

        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| TrendError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrendError::Fetch {
                url: url.to_string(),
                message: format!("HTTP {status}"),
            }
            .into());
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read body from {url}"))?;
        debug!(url, bytes = body.len(), "Listing fetched");
        Ok(body)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}
