//! Run and window reports.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::types::{EntityKind, Window};

/// Where a window (or one entity within it) is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Extracting,
    Reconciling,
    Augmenting,
    Committing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Reconciling => "reconciling",
            Stage::Augmenting => "augmenting",
            Stage::Committing => "committing",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Outcome of processing one (kind, window) listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReport {
    pub kind: EntityKind,
    pub window: Window,
    pub fetch_failed: bool,
    pub extracted: usize,
    pub parse_misses: usize,
    pub field_degrades: usize,
    /// Stale entities re-augmented and replaced.
    pub refreshed: usize,
    /// Fresh entities re-linked unchanged.
    pub reused: usize,
    /// Entities whose summary or tag call failed.
    pub augmentation_failures: usize,
    /// Entities that hit an unexpected error and were skipped.
    pub failed: usize,
    /// Entities whose snapshot lacked a summary or tags after commit.
    pub incomplete: usize,
    pub pruned: u64,
    pub degraded: bool,
}

impl WindowReport {
    pub fn new(kind: EntityKind, window: Window) -> Self {
        Self {
            kind,
            window,
            fetch_failed: false,
            extracted: 0,
            parse_misses: 0,
            field_degrades: 0,
            refreshed: 0,
            reused: 0,
            augmentation_failures: 0,
            failed: 0,
            incomplete: 0,
            pruned: 0,
            degraded: false,
        }
    }
}

impl fmt::Display for WindowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}: extracted={} misses={} refreshed={} reused={} aug_failed={} failed={} incomplete={}{}",
            self.kind,
            self.window,
            self.extracted,
            self.parse_misses,
            self.refreshed,
            self.reused,
            self.augmentation_failures,
            self.failed,
            self.incomplete,
            if self.degraded { " DEGRADED" } else { "" },
        )
    }
}

/// Summary of a complete run over every configured listing.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub windows: Vec<WindowReport>,
}

impl RunReport {
    /// A run is degraded when any of its windows is.
    pub fn is_degraded(&self) -> bool {
        self.windows.iter().any(|w| w.degraded)
    }

    pub fn window(&self, kind: EntityKind, window: Window) -> Option<&WindowReport> {
        self.windows.iter().find(|w| w.kind == kind && w.window == window)
    }

    pub fn log(&self) {
        for w in &self.windows {
            if w.degraded {
                warn!(run_id = %self.run_id, report = %w, "Window degraded");
            } else {
                info!(run_id = %self.run_id, report = %w, "Window complete");
            }
        }
        info!(
            run_id = %self.run_id,
            windows = self.windows.len(),
            degraded = self.is_degraded(),
            elapsed_ms = (self.finished_at - self.started_at).num_milliseconds(),
            "Run complete"
        );
    }
}
