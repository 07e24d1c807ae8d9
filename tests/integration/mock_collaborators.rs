//! Mock collaborators for integration testing.
//!
//! Provides a deterministic `TrendingSource` serving canned listing pages,
//! a scripted `Augmenter` whose failures can be targeted at specific
//! entities, and a `TrendingStore` wrapper that fails chosen commits.
//! Everything is in-memory with no network access.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use trendfeed::fetch::TrendingSource;
use trendfeed::llm::Augmenter;
use trendfeed::storage::{EntityCommit, TrendingStore};
use trendfeed::types::{EntityKey, EntityKind, StoredEntity, TrendingEntity, Window};

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Serves pages keyed by `"<url>?since=<window>"`. Unknown keys fail like
/// a refused connection.
#[derive(Default)]
pub struct MockSource {
    pages: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
    /// If set, every fetch fails with this message.
    force_error: Mutex<Option<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_page(&self, url: &str, since: &str, body: String) {
        self.pages.lock().unwrap().insert(format!("{url}?since={since}"), body);
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Every request key seen so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrendingSource for MockSource {
    async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<String> {
        let since = params
            .iter()
            .find(|(k, _)| k == "since")
            .map(|(_, v)| v.as_str())
            .unwrap_or_default();
        let key = format!("{url}?since={since}");
        self.requests.lock().unwrap().push(key.clone());

        if let Some(msg) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{msg}"));
        }
        self.pages
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {key}"))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Augmenter
// ---------------------------------------------------------------------------

/// Returns `"<identity> summary"` and tags `["trending", "<kind>"]`
/// unless the entity is scripted to fail.
#[derive(Default)]
pub struct ScriptedAugmenter {
    fail_summary_for: Mutex<HashSet<String>>,
    fail_tags_for: Mutex<HashSet<String>>,
    summary_calls: AtomicUsize,
    tag_calls: AtomicUsize,
}

impl ScriptedAugmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_summary(&self, identity: &str) {
        self.fail_summary_for.lock().unwrap().insert(identity.to_string());
    }

    pub fn fail_tags(&self, identity: &str) {
        self.fail_tags_for.lock().unwrap().insert(identity.to_string());
    }

    pub fn heal(&self) {
        self.fail_summary_for.lock().unwrap().clear();
        self.fail_tags_for.lock().unwrap().clear();
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    pub fn tag_calls(&self) -> usize {
        self.tag_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Augmenter for ScriptedAugmenter {
    async fn summarize(&self, entity: &TrendingEntity, locale: &str) -> Result<String> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_summary_for.lock().unwrap().contains(&entity.identity) {
            return Err(anyhow!("scripted summary failure for {}", entity.identity));
        }
        Ok(format!("{} summary ({locale})", entity.identity))
    }

    async fn tag(&self, entity: &TrendingEntity, _locale: &str) -> Result<Vec<String>> {
        self.tag_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_tags_for.lock().unwrap().contains(&entity.identity) {
            return Err(anyhow!("scripted tag failure for {}", entity.identity));
        }
        Ok(vec!["trending".to_string(), entity.kind.to_string()])
    }
}

/// Panics on every summary request.
pub struct PanickingAugmenter {
    calls: AtomicUsize,
}

impl PanickingAugmenter {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Augmenter for PanickingAugmenter {
    async fn summarize(&self, entity: &TrendingEntity, _locale: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("augmenter crashed on {}", entity.identity);
    }

    async fn tag(&self, _entity: &TrendingEntity, _locale: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Delegates to an inner store but rejects commits for scripted ranks.
pub struct FailingStore<S> {
    inner: Arc<S>,
    fail_ranks: Mutex<HashSet<u32>>,
}

impl<S: TrendingStore + 'static> FailingStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            fail_ranks: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_commit_at(&self, rank: u32) {
        self.fail_ranks.lock().unwrap().insert(rank);
    }
}

#[async_trait]
impl<S: TrendingStore + 'static> TrendingStore for FailingStore<S> {
    async fn find_entity(&self, key: &EntityKey) -> Result<Option<StoredEntity>> {
        self.inner.find_entity(key).await
    }

    async fn commit(&self, commit: &EntityCommit) -> Result<i64> {
        if self.fail_ranks.lock().unwrap().contains(&commit.rank) {
            return Err(anyhow!("scripted commit failure at rank {}", commit.rank));
        }
        self.inner.commit(commit).await
    }

    async fn snapshot_entity(&self, kind: EntityKind, window: Window, rank: u32) -> Result<Option<StoredEntity>> {
        self.inner.snapshot_entity(kind, window, rank).await
    }

    async fn current_listing(&self, kind: EntityKind, window: Window) -> Result<Vec<StoredEntity>> {
        self.inner.current_listing(kind, window).await
    }

    async fn prune_snapshots(&self, kind: EntityKind, window: Window, max_rank: u32) -> Result<u64> {
        self.inner.prune_snapshots(kind, window, max_rank).await
    }

    async fn count_entities(&self) -> Result<i64> {
        self.inner.count_entities().await
    }

    async fn count_snapshots(&self) -> Result<i64> {
        self.inner.count_snapshots().await
    }
}

// ---------------------------------------------------------------------------
// Markup builders
// ---------------------------------------------------------------------------

pub fn repo_item(owner: &str, name: &str, stars_today: &str) -> String {
    format!(
        r##"<article class="Box-row">
  <div class="float-right d-flex"><a href="/login" class="btn btn-sm">Star</a></div>
  <h2 class="h3 lh-condensed">
    <a href="/{owner}/{name}" class="Link"><span class="text-normal">{owner} /</span> {name}</a>
  </h2>
  <p class="col-9 color-fg-muted my-1 pr-4">{name} does things</p>
  <div class="f6 color-fg-muted mt-2">
    <span class="d-inline-block ml-0 mr-3">
      <span class="repo-language-color" style="background-color: #dea584"></span>
      <span itemprop="programmingLanguage">Rust</span>
    </span>
    <a href="/{owner}/{name}/stargazers" class="Link Link--muted d-inline-block mr-3">4,321</a>
    <a href="/{owner}/{name}/forks" class="Link Link--muted d-inline-block mr-3">210</a>
    <span class="d-inline-block float-sm-right">{stars_today} stars today</span>
  </div>
</article>
"##
    )
}

pub fn dev_item(username: &str, display: &str) -> String {
    format!(
        r##"<article class="Box-row d-flex" id="pa-{username}">
  <a class="color-fg-muted f6" href="#pa-{username}">1</a>
  <div class="mx-3">
    <a href="/{username}"><img class="rounded avatar-user" src="https://avatars.githubusercontent.com/{username}" /></a>
  </div>
  <div class="col-md-6">
    <h1 class="h3 lh-condensed"><a href="/{username}">{display}</a></h1>
  </div>
</article>
"##
    )
}

pub fn page(items: &[String]) -> String {
    format!(
        "<html>\n<body>\n<nav><a href=\"/explore\">Explore</a></nav>\n<div class=\"Box\">\n{}</div>\n</body>\n</html>\n",
        items.concat()
    )
}

/// A repository listing of `n` items named `org/repo1..n`.
pub fn repo_listing(n: usize) -> String {
    let items: Vec<String> = (1..=n).map(|i| repo_item("org", &format!("repo{i}"), "100")).collect();
    page(&items)
}
