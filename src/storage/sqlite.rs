//! SQLite-backed [`TrendingStore`].
//!
//! Schema:
//! - `entities`: one row per `(kind, identity, since, summary_locale)`.
//! - `tags`: owned by an entity, removed with it (`ON DELETE CASCADE`).
//! - `snapshots`: one row per `(kind, since, rank)` pointing at an entity,
//!   also removed with the entity it points at.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use super::{CommitAction, EntityCommit, TrendingStore};
use crate::types::{
    normalize_tags, Contributor, EntityKey, EntityKind, PopularRepo, StoredEntity, TrendError, TrendingEntity,
    Window,
};

const ENTITY_COLUMNS: &str = "e.id AS id, e.kind AS kind, e.identity AS identity, e.since AS since, \
     e.summary_locale AS summary_locale, e.rank AS rank, e.url AS url, e.owner AS owner, e.name AS name, \
     e.description AS description, e.language AS language, e.language_color AS language_color, \
     e.total_count AS total_count, e.secondary_count AS secondary_count, e.window_delta AS window_delta, \
     e.contributors_json AS contributors_json, e.display_name AS display_name, e.avatar_url AS avatar_url, \
     e.popular_repo_json AS popular_repo_json, e.summary AS summary, e.created_at AS created_at, \
     e.refreshed_at AS refreshed_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and run migrations.
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory for {path}"))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {path}"))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path, "Store ready");
        Ok(store)
    }

    /// A private in-memory database. Single connection so every query
    /// sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                identity TEXT NOT NULL,
                since TEXT NOT NULL,
                summary_locale TEXT NOT NULL,
                rank INTEGER NOT NULL,
                url TEXT NOT NULL,
                owner TEXT,
                name TEXT,
                description TEXT,
                language TEXT,
                language_color TEXT,
                total_count INTEGER,
                secondary_count INTEGER,
                window_delta INTEGER,
                contributors_json TEXT NOT NULL DEFAULT '[]',
                display_name TEXT,
                avatar_url TEXT,
                popular_repo_json TEXT,
                summary TEXT,
                created_at INTEGER NOT NULL,
                refreshed_at INTEGER NOT NULL,
                UNIQUE(kind, identity, since, summary_locale)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                label TEXT NOT NULL,
                UNIQUE(entity_id, label),
                FOREIGN KEY (entity_id) REFERENCES entities(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                since TEXT NOT NULL,
                rank INTEGER NOT NULL,
                entity_id INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(kind, since, rank),
                FOREIGN KEY (entity_id) REFERENCES entities(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tags_entity_id ON tags(entity_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_entity_id ON snapshots(entity_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load_tags(&self, entity_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT label FROM tags WHERE entity_id = ? ORDER BY position ASC")
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("label").map_err(Into::into))
            .collect()
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<StoredEntity> {
        let mut stored = entity_from_row(row)?;
        stored.entity.tags = self.load_tags(stored.id).await?;
        Ok(stored)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn ts(dt: Option<DateTime<Utc>>) -> i64 {
    dt.unwrap_or_else(Utc::now).timestamp()
}

fn from_ts(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn opt_u64(v: Option<i64>) -> Option<u64> {
    v.and_then(|n| u64::try_from(n).ok())
}

fn opt_i64(v: Option<u64>) -> Option<i64> {
    v.and_then(|n| i64::try_from(n).ok())
}

fn entity_from_row(row: &SqliteRow) -> Result<StoredEntity> {
    let kind: EntityKind = row.try_get::<String, _>("kind")?.parse()?;
    let window: Window = row.try_get::<String, _>("since")?.parse()?;
    let rank: i64 = row.try_get("rank")?;

    let mut entity = TrendingEntity::new(
        kind,
        u32::try_from(rank).unwrap_or(0),
        row.try_get::<String, _>("identity")?,
        row.try_get::<String, _>("url")?,
    );
    entity.owner = row.try_get("owner")?;
    entity.name = row.try_get("name")?;
    entity.description = row.try_get("description")?;
    entity.language = row.try_get("language")?;
    entity.language_color = row.try_get("language_color")?;
    entity.total_count = opt_u64(row.try_get("total_count")?);
    entity.secondary_count = opt_u64(row.try_get("secondary_count")?);
    entity.window_delta = opt_u64(row.try_get("window_delta")?);

    let contributors_json: String = row.try_get("contributors_json")?;
    entity.contributors = serde_json::from_str::<Vec<Contributor>>(&contributors_json).unwrap_or_default();
    entity.display_name = row.try_get("display_name")?;
    entity.avatar_url = row.try_get("avatar_url")?;
    let popular_json: Option<String> = row.try_get("popular_repo_json")?;
    entity.popular_repo = popular_json.and_then(|j| serde_json::from_str::<PopularRepo>(&j).ok());

    entity.summary = row.try_get("summary")?;
    entity.summary_locale = Some(row.try_get("summary_locale")?);
    entity.window = Some(window);
    entity.created_at = from_ts(row.try_get("created_at")?);
    entity.refreshed_at = from_ts(row.try_get("refreshed_at")?);

    Ok(StoredEntity {
        id: row.try_get("id")?,
        entity,
    })
}

// ---------------------------------------------------------------------------
// Transaction steps
// ---------------------------------------------------------------------------

async fn insert_entity(tx: &mut Transaction<'_, Sqlite>, window: Window, entity: &TrendingEntity) -> Result<i64> {
    let locale = entity
        .summary_locale
        .as_deref()
        .ok_or_else(|| TrendError::Storage(format!("{} has no summary locale", entity.identity)))?;

    // Wholesale replacement: the old row, its tags and its snapshots go.
    sqlx::query("DELETE FROM entities WHERE kind = ? AND identity = ? AND since = ? AND summary_locale = ?")
        .bind(entity.kind.as_str())
        .bind(&entity.identity)
        .bind(window.as_str())
        .bind(locale)
        .execute(&mut **tx)
        .await?;

    let contributors_json = serde_json::to_string(&entity.contributors)?;
    let popular_json = entity.popular_repo.as_ref().map(serde_json::to_string).transpose()?;

    let result = sqlx::query(
        r#"
        INSERT INTO entities (kind, identity, since, summary_locale, rank, url, owner, name,
                              description, language, language_color, total_count,
                              secondary_count, window_delta, contributors_json, display_name,
                              avatar_url, popular_repo_json, summary, created_at, refreshed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entity.kind.as_str())
    .bind(&entity.identity)
    .bind(window.as_str())
    .bind(locale)
    .bind(i64::from(entity.rank))
    .bind(&entity.url)
    .bind(&entity.owner)
    .bind(&entity.name)
    .bind(&entity.description)
    .bind(&entity.language)
    .bind(&entity.language_color)
    .bind(opt_i64(entity.total_count))
    .bind(opt_i64(entity.secondary_count))
    .bind(opt_i64(entity.window_delta))
    .bind(&contributors_json)
    .bind(&entity.display_name)
    .bind(&entity.avatar_url)
    .bind(&popular_json)
    .bind(&entity.summary)
    .bind(ts(entity.created_at))
    .bind(ts(entity.refreshed_at))
    .execute(&mut **tx)
    .await?;

    let entity_id = result.last_insert_rowid();

    for (position, label) in normalize_tags(&entity.tags).iter().enumerate() {
        sqlx::query("INSERT INTO tags (entity_id, position, label) VALUES (?, ?, ?)")
            .bind(entity_id)
            .bind(position as i64)
            .bind(label)
            .execute(&mut **tx)
            .await?;
    }

    Ok(entity_id)
}

async fn align_rank(tx: &mut Transaction<'_, Sqlite>, entity_id: i64, rank: u32) -> Result<()> {
    let result = sqlx::query("UPDATE entities SET rank = ? WHERE id = ?")
        .bind(i64::from(rank))
        .bind(entity_id)
        .execute(&mut **tx)
        .await?;
    if result.rows_affected() != 1 {
        return Err(TrendError::Storage(format!("entity {entity_id} no longer exists")).into());
    }
    Ok(())
}

async fn upsert_snapshot(
    tx: &mut Transaction<'_, Sqlite>,
    kind: EntityKind,
    window: Window,
    rank: u32,
    entity_id: i64,
) -> Result<()> {
    // An entity is linked from at most one rank per listing.
    sqlx::query("DELETE FROM snapshots WHERE kind = ? AND since = ? AND entity_id = ? AND rank <> ?")
        .bind(kind.as_str())
        .bind(window.as_str())
        .bind(entity_id)
        .bind(i64::from(rank))
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO snapshots (kind, since, rank, entity_id, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(kind, since, rank) DO UPDATE SET
            entity_id = excluded.entity_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(kind.as_str())
    .bind(window.as_str())
    .bind(i64::from(rank))
    .bind(entity_id)
    .bind(Utc::now().timestamp())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Store impl
// ---------------------------------------------------------------------------

#[async_trait]
impl TrendingStore for SqliteStore {
    async fn find_entity(&self, key: &EntityKey) -> Result<Option<StoredEntity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM entities e \
             WHERE e.kind = ? AND e.identity = ? AND e.since = ? AND e.summary_locale = ?"
        );
        let row = sqlx::query(&sql)
            .bind(key.kind.as_str())
            .bind(&key.identity)
            .bind(key.window.as_str())
            .bind(&key.locale)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn commit(&self, commit: &EntityCommit) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let entity_id = match &commit.action {
            CommitAction::Reuse { entity_id } => {
                align_rank(&mut tx, *entity_id, commit.rank).await?;
                *entity_id
            }
            CommitAction::Replace { entity } => insert_entity(&mut tx, commit.window, entity).await?,
        };

        upsert_snapshot(&mut tx, commit.kind, commit.window, commit.rank, entity_id).await?;
        tx.commit().await?;

        debug!(
            kind = %commit.kind,
            window = %commit.window,
            rank = commit.rank,
            entity_id,
            "Commit applied"
        );
        Ok(entity_id)
    }

    async fn snapshot_entity(&self, kind: EntityKind, window: Window, rank: u32) -> Result<Option<StoredEntity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM snapshots s JOIN entities e ON e.id = s.entity_id \
             WHERE s.kind = ? AND s.since = ? AND s.rank = ?"
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(window.as_str())
            .bind(i64::from(rank))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn current_listing(&self, kind: EntityKind, window: Window) -> Result<Vec<StoredEntity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM snapshots s JOIN entities e ON e.id = s.entity_id \
             WHERE s.kind = ? AND s.since = ? ORDER BY s.rank ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(window.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut listing = Vec::with_capacity(rows.len());
        for row in &rows {
            listing.push(self.hydrate(row).await?);
        }
        Ok(listing)
    }

    async fn prune_snapshots(&self, kind: EntityKind, window: Window, max_rank: u32) -> Result<u64> {
        let result = sqlx::query("DELETE FROM snapshots WHERE kind = ? AND since = ? AND rank > ?")
            .bind(kind.as_str())
            .bind(window.as_str())
            .bind(i64::from(max_rank))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_entities(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn count_snapshots(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
