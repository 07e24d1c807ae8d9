//! Persistence layer.
//!
//! The [`TrendingStore`] trait is the orchestrator's only view of
//! storage. Every write for one entity goes through [`TrendingStore::commit`],
//! which implementations must apply atomically.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{EntityKey, EntityKind, StoredEntity, TrendingEntity, Window};

/// What to do with one reconciled entity.
#[derive(Debug, Clone)]
pub enum CommitAction {
    /// Keep the stored row; only re-point the snapshot to it.
    Reuse { entity_id: i64 },
    /// Discard any row with the same natural key (cascading its tags and
    /// snapshots), insert `entity` with its tags, and point the snapshot
    /// at the new row. `entity.summary_locale` must be set.
    Replace { entity: Box<TrendingEntity> },
}

/// One entity's replace-and-relink unit of work.
#[derive(Debug, Clone)]
pub struct EntityCommit {
    pub kind: EntityKind,
    pub window: Window,
    pub rank: u32,
    pub action: CommitAction,
}

/// Abstract storage backend for entities, tags and ranking snapshots.
#[async_trait]
pub trait TrendingStore: Send + Sync {
    /// Look up the current entity for `(kind, identity, window, locale)`.
    async fn find_entity(&self, key: &EntityKey) -> Result<Option<StoredEntity>>;

    /// Apply one commit in a single transaction. Returns the id of the
    /// entity the snapshot now points at.
    async fn commit(&self, commit: &EntityCommit) -> Result<i64>;

    /// The entity currently linked from `(kind, window, rank)`.
    async fn snapshot_entity(&self, kind: EntityKind, window: Window, rank: u32) -> Result<Option<StoredEntity>>;

    /// All linked entities of a listing in rank order. This is what the
    /// feed layer reads.
    async fn current_listing(&self, kind: EntityKind, window: Window) -> Result<Vec<StoredEntity>>;

    /// Remove snapshots of a listing ranked beyond `max_rank`.
    /// Returns the number of snapshots removed.
    async fn prune_snapshots(&self, kind: EntityKind, window: Window, max_rank: u32) -> Result<u64>;

    async fn count_entities(&self) -> Result<i64>;

    async fn count_snapshots(&self) -> Result<i64>;
}
