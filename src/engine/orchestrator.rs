//! Incremental update orchestrator.
//!
//! One run walks every configured (kind, window) listing in sequence:
//! fetch the page, extract its entities, then for each entity either
//! re-link the fresh stored row or augment and replace a stale one.
//! Failures are contained at the smallest scope that can absorb them
//! (field, entity, window, run) and surface as a degraded report, which
//! shortens the delay before the next run.

use anyhow::Result;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::reconcile::{self, Decision};
use super::report::{RunReport, Stage, WindowReport};
use crate::config::AppConfig;
use crate::extract;
use crate::fetch::{ListingFilters, ListingRequest, TrendingSource};
use crate::llm::Augmenter;
use crate::storage::{CommitAction, EntityCommit, TrendingStore};
use crate::types::{EntityKind, TrendingEntity, Window};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub base_url: String,
    pub kinds: Vec<EntityKind>,
    pub windows: Vec<Window>,
    pub filters: ListingFilters,
    /// Maximum age of a stored entity, and the delay after a clean run.
    pub refresh_interval: Duration,
    /// Delay after a degraded run.
    pub backoff_interval: Duration,
    /// Summary language; part of every entity key.
    pub locale: String,
}

impl OrchestratorConfig {
    pub fn from_app(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            base_url: cfg.trending.base_url.clone(),
            kinds: cfg.kinds()?,
            windows: cfg.windows()?,
            filters: cfg.filters(),
            refresh_interval: cfg.refresh_interval(),
            backoff_interval: cfg.backoff_interval(),
            locale: cfg.llm.summary_language.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative stop signal shared between the run loop and its owner.
///
/// Checked before each run. Setting it also wakes the loop out of its
/// inter-run sleep, but never interrupts a run in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    wake: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        // notify_one leaves a permit if nobody is sleeping yet.
        self.inner.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless cancelled first. Returns true when
    /// the flag is set.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_cancelled(),
            _ = self.inner.wake.notified() => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Failure that aborted one entity's processing.
#[derive(Debug)]
struct EntityFailure {
    stage: Stage,
    error: anyhow::Error,
}

impl EntityFailure {
    fn at(stage: Stage) -> impl FnOnce(anyhow::Error) -> Self {
        move |error| Self { stage, error }
    }
}

#[derive(Debug, Default)]
struct EntityOutcome {
    refreshed: bool,
    augmentation_failed: bool,
    complete: bool,
}

pub struct Orchestrator {
    source: Arc<dyn TrendingSource>,
    augmenter: Arc<dyn Augmenter>,
    store: Arc<dyn TrendingStore>,
    config: OrchestratorConfig,
    cancel: CancelFlag,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn TrendingSource>,
        augmenter: Arc<dyn Augmenter>,
        store: Arc<dyn TrendingStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            source,
            augmenter,
            store,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Handle for stopping [`Orchestrator::run`] from another task.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run until cancelled. Each iteration performs one full run and then
    /// sleeps for the refresh interval, or the backoff interval if the run
    /// was degraded or failed outright.
    pub async fn run(&self) {
        info!(
            source = self.source.name(),
            kinds = ?self.config.kinds,
            windows = ?self.config.windows,
            refresh_secs = self.config.refresh_interval.as_secs(),
            backoff_secs = self.config.backoff_interval.as_secs(),
            "Orchestrator started"
        );

        let mut runs: u64 = 0;
        while !self.cancel.is_cancelled() {
            runs += 1;
            let degraded = match AssertUnwindSafe(self.run_once()).catch_unwind().await {
                Ok(report) => {
                    report.log();
                    report.is_degraded()
                }
                Err(panic) => {
                    error!(run = runs, reason = panic_message(&*panic), "Run aborted by panic");
                    true
                }
            };

            let delay = if degraded {
                self.config.backoff_interval
            } else {
                self.config.refresh_interval
            };
            info!(run = runs, degraded, delay_secs = delay.as_secs(), "Next run scheduled");
            if self.cancel.sleep(delay).await {
                break;
            }
        }

        info!(runs, "Orchestrator stopped");
    }

    /// Perform one pass over every configured listing.
    pub async fn run_once(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("run", %run_id);

        let windows = async {
            info!(locale = %self.config.locale, "Run starting");
            let mut reports = Vec::with_capacity(self.config.kinds.len() * self.config.windows.len());
            for &kind in &self.config.kinds {
                for &window in &self.config.windows {
                    reports.push(self.process_window(kind, window).await);
                }
            }
            reports
        }
        .instrument(span)
        .await;

        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            windows,
        }
    }

    async fn process_window(&self, kind: EntityKind, window: Window) -> WindowReport {
        let mut report = WindowReport::new(kind, window);
        let request = ListingRequest::new(&self.config.base_url, kind, window, &self.config.filters);

        debug!(%kind, %window, stage = %Stage::Fetching, url = %request.url, "Fetching listing");
        let markup = match self.source.fetch(&request.url, &request.params).await {
            Ok(body) => body,
            Err(e) => {
                warn!(%kind, %window, stage = %Stage::Fetching, error = %e, "Fetch failed; listing treated as empty");
                report.fetch_failed = true;
                report.degraded = true;
                return report;
            }
        };

        debug!(%kind, %window, stage = %Stage::Extracting, bytes = markup.len(), "Extracting listing");
        let extraction = extract::extract(kind, &markup);
        report.extracted = extraction.entities.len();
        report.parse_misses = extraction.parse_misses;
        report.field_degrades = extraction.field_degrades;
        if extraction.is_empty() {
            warn!(%kind, %window, "No entities extracted");
            return report;
        }

        for entity in extraction.entities {
            let identity = entity.identity.clone();
            let rank = entity.rank;
            match self.process_entity(kind, window, entity).await {
                Ok(outcome) => {
                    if outcome.refreshed {
                        report.refreshed += 1;
                    } else {
                        report.reused += 1;
                    }
                    if outcome.augmentation_failed {
                        report.augmentation_failures += 1;
                        report.degraded = true;
                    }
                    if !outcome.complete {
                        warn!(%kind, %window, rank, %identity, "Linked entity is missing summary or tags");
                        report.incomplete += 1;
                        report.degraded = true;
                    }
                }
                Err(failure) => {
                    error!(
                        %kind, %window, rank, %identity,
                        stage = %failure.stage,
                        error = %failure.error,
                        "Entity processing failed"
                    );
                    report.failed += 1;
                    report.degraded = true;
                }
            }
        }

        let max_rank = u32::try_from(report.extracted).unwrap_or(u32::MAX);
        match self.store.prune_snapshots(kind, window, max_rank).await {
            Ok(pruned) => {
                if pruned > 0 {
                    debug!(%kind, %window, pruned, "Pruned snapshots beyond current listing");
                }
                report.pruned = pruned;
            }
            Err(e) => {
                error!(%kind, %window, stage = %Stage::Committing, error = %e, "Snapshot pruning failed");
                report.degraded = true;
            }
        }

        debug!(%kind, %window, stage = %Stage::Done, "Window processed");
        report
    }

    async fn process_entity(
        &self,
        kind: EntityKind,
        window: Window,
        entity: TrendingEntity,
    ) -> Result<EntityOutcome, EntityFailure> {
        let rank = entity.rank;
        let key = reconcile::entity_key(&entity, window, &self.config.locale);
        let existing = self
            .store
            .find_entity(&key)
            .await
            .map_err(EntityFailure::at(Stage::Reconciling))?;

        let now = Utc::now();
        let mut outcome = EntityOutcome::default();
        let action = match reconcile::decide(existing, now, self.config.refresh_interval) {
            Decision::Reuse(stored) => {
                debug!(identity = %entity.identity, entity_id = stored.id, "Reusing stored entity");
                CommitAction::Reuse { entity_id: stored.id }
            }
            Decision::Refresh => {
                let (summary, tags, failed) = self.augment(&entity).await;
                outcome.refreshed = true;
                outcome.augmentation_failed = failed;
                let fresh = reconcile::stamp(entity, window, &self.config.locale, now, summary, tags);
                CommitAction::Replace { entity: Box::new(fresh) }
            }
        };

        let commit = EntityCommit { kind, window, rank, action };
        self.store
            .commit(&commit)
            .await
            .map_err(EntityFailure::at(Stage::Committing))?;

        outcome.complete = self
            .store
            .snapshot_entity(kind, window, rank)
            .await
            .map_err(EntityFailure::at(Stage::Committing))?
            .is_some_and(|linked| linked.entity.is_augmented());

        Ok(outcome)
    }

    /// Summarize and tag independently. A failed call yields nothing for
    /// its field; the third element reports whether either call failed.
    async fn augment(&self, entity: &TrendingEntity) -> (Option<String>, Vec<String>, bool) {
        let locale = &self.config.locale;
        let mut failed = false;

        let summary = match self.augmenter.summarize(entity, locale).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(identity = %entity.identity, stage = %Stage::Augmenting, error = %e, "Summary failed");
                failed = true;
                None
            }
        };

        let tags = match self.augmenter.tag(entity, locale).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(identity = %entity.identity, stage = %Stage::Augmenting, error = %e, "Tagging failed");
                failed = true;
                Vec::new()
            }
        };

        (summary, tags, failed)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
