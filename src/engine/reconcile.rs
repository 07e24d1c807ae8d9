//! Per-entity reconciliation: decide whether a freshly extracted entity
//! can reuse its stored counterpart or must be re-augmented.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::types::{normalize_tags, EntityKey, StoredEntity, TrendingEntity, Window};

/// What the orchestrator should do with one extracted entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Stored row is fresh and complete; link it as-is.
    Reuse(StoredEntity),
    /// Missing, expired or incomplete; augment and replace.
    Refresh,
}

/// Natural key of `entity` within a listing.
pub fn entity_key(entity: &TrendingEntity, window: Window, locale: &str) -> EntityKey {
    EntityKey {
        kind: entity.kind,
        identity: entity.identity.clone(),
        window,
        locale: locale.to_string(),
    }
}

/// A stored entity is stale when it is older than `refresh_interval`
/// (measured from `created_at`) or lacks either augmentation output.
/// An unknown creation time counts as stale. A creation time in the
/// future does not.
pub fn is_stale(existing: &TrendingEntity, now: DateTime<Utc>, refresh_interval: Duration) -> bool {
    if !existing.is_augmented() {
        return true;
    }
    let Some(created) = existing.created_at else {
        return true;
    };
    match (now - created).to_std() {
        Ok(age) => age > refresh_interval,
        Err(_) => false,
    }
}

pub fn decide(existing: Option<StoredEntity>, now: DateTime<Utc>, refresh_interval: Duration) -> Decision {
    match existing {
        Some(stored) if !is_stale(&stored.entity, now, refresh_interval) => Decision::Reuse(stored),
        _ => Decision::Refresh,
    }
}

/// Build the replacement row: the extracted fields plus augmentation
/// outputs and bookkeeping stamps.
pub fn stamp(
    mut entity: TrendingEntity,
    window: Window,
    locale: &str,
    now: DateTime<Utc>,
    summary: Option<String>,
    tags: Vec<String>,
) -> TrendingEntity {
    entity.window = Some(window);
    entity.summary_locale = Some(locale.to_string());
    entity.summary = summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    entity.tags = normalize_tags(tags);
    entity.created_at = Some(now);
    entity.refreshed_at = Some(now);
    entity
}
