//! Full fetch → extract → reconcile → commit runs over the in-memory
//! collaborators and an in-memory SQLite store.

use std::sync::Arc;
use std::time::Duration;

use trendfeed::engine::{Orchestrator, OrchestratorConfig};
use trendfeed::fetch::ListingFilters;
use trendfeed::storage::sqlite::SqliteStore;
use trendfeed::storage::TrendingStore;
use trendfeed::types::{EntityKind, Window};

use crate::mock_collaborators::{
    dev_item, page, repo_item, repo_listing, FailingStore, MockSource, PanickingAugmenter, ScriptedAugmenter,
};

const BASE: &str = "https://github.com/trending";
const DEVELOPERS: &str = "https://github.com/trending/developers";
const LOCALE: &str = "English";

struct Harness {
    source: Arc<MockSource>,
    augmenter: Arc<ScriptedAugmenter>,
    store: Arc<SqliteStore>,
    orchestrator: Orchestrator,
}

fn config(kinds: Vec<EntityKind>, windows: Vec<Window>, refresh_interval: Duration) -> OrchestratorConfig {
    OrchestratorConfig {
        base_url: BASE.to_string(),
        kinds,
        windows,
        filters: ListingFilters::default(),
        refresh_interval,
        backoff_interval: Duration::from_millis(5),
        locale: LOCALE.to_string(),
    }
}

async fn harness(kinds: Vec<EntityKind>, windows: Vec<Window>, refresh_interval: Duration) -> Harness {
    let source = Arc::new(MockSource::new());
    let augmenter = Arc::new(ScriptedAugmenter::new());
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let config = config(kinds, windows, refresh_interval);
    let orchestrator = Orchestrator::new(source.clone(), augmenter.clone(), store.clone(), config);
    Harness {
        source,
        augmenter,
        store,
        orchestrator,
    }
}

async fn daily_repos() -> Harness {
    harness(vec![EntityKind::Repository], vec![Window::Daily], Duration::from_secs(6 * 3600)).await
}

#[tokio::test]
async fn test_first_run_populates_listing() {
    let h = daily_repos().await;
    h.source.set_page(BASE, "daily", repo_listing(5));

    let report = h.orchestrator.run_once().await;
    assert!(!report.is_degraded());
    let w = report.window(EntityKind::Repository, Window::Daily).unwrap();
    assert_eq!((w.extracted, w.refreshed, w.reused, w.failed), (5, 5, 0, 0));

    let listing = h.store.current_listing(EntityKind::Repository, Window::Daily).await.unwrap();
    assert_eq!(listing.len(), 5);
    for (i, stored) in listing.iter().enumerate() {
        let e = &stored.entity;
        assert_eq!(e.rank as usize, i + 1);
        assert_eq!(e.identity, format!("org/repo{}", i + 1));
        assert_eq!(e.total_count, Some(4321));
        assert_eq!(e.secondary_count, Some(210));
        assert_eq!(e.window_delta, Some(100));
        assert_eq!(e.language.as_deref(), Some("Rust"));
        assert_eq!(e.window, Some(Window::Daily));
        assert_eq!(e.summary_locale.as_deref(), Some(LOCALE));
        assert_eq!(e.summary.as_deref(), Some(format!("org/repo{} summary (English)", i + 1).as_str()));
        assert_eq!(e.tags, vec!["trending", "repository"]);
    }
}

#[tokio::test]
async fn test_second_run_reuses_without_augmenting() {
    let h = daily_repos().await;
    h.source.set_page(BASE, "daily", repo_listing(4));

    h.orchestrator.run_once().await;
    let before = h.store.current_listing(EntityKind::Repository, Window::Daily).await.unwrap();

    let report = h.orchestrator.run_once().await;
    let w = &report.windows[0];
    assert_eq!((w.refreshed, w.reused), (0, 4));
    assert!(!report.is_degraded());
    assert_eq!(h.augmenter.summary_calls(), 4);
    assert_eq!(h.augmenter.tag_calls(), 4);

    let after = h.store.current_listing(EntityKind::Repository, Window::Daily).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(h.store.count_entities().await.unwrap(), 4);
    assert_eq!(h.store.count_snapshots().await.unwrap(), 4);
}

#[tokio::test]
async fn test_augmentation_failure_is_isolated_and_self_heals() {
    let h = daily_repos().await;
    h.source.set_page(BASE, "daily", repo_listing(10));
    h.augmenter.fail_summary("org/repo3");

    let report = h.orchestrator.run_once().await;
    let w = &report.windows[0];
    assert!(w.degraded);
    assert_eq!(w.augmentation_failures, 1);
    assert_eq!(w.incomplete, 1);
    assert_eq!(w.failed, 0);

    let listing = h.store.current_listing(EntityKind::Repository, Window::Daily).await.unwrap();
    assert_eq!(listing.len(), 10);
    for stored in &listing {
        if stored.entity.identity == "org/repo3" {
            assert!(stored.entity.summary.is_none());
            assert_eq!(stored.entity.tags, vec!["trending", "repository"]);
        } else {
            assert!(stored.entity.is_augmented(), "{} not augmented", stored.entity.identity);
        }
    }

    // Next run retries only the incomplete entity.
    h.augmenter.heal();
    let report = h.orchestrator.run_once().await;
    let w = &report.windows[0];
    assert!(!report.is_degraded());
    assert_eq!((w.refreshed, w.reused), (1, 9));
    assert_eq!(h.augmenter.summary_calls(), 11);

    let healed = h
        .store
        .snapshot_entity(EntityKind::Repository, Window::Daily, 3)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(healed.entity.summary.as_deref(), Some("org/repo3 summary (English)"));
    assert_eq!(h.store.count_entities().await.unwrap(), 10);
}

#[tokio::test]
async fn test_tag_failure_keeps_summary() {
    let h = daily_repos().await;
    h.source.set_page(BASE, "daily", repo_listing(2));
    h.augmenter.fail_tags("org/repo1");

    let report = h.orchestrator.run_once().await;
    assert!(report.is_degraded());

    let first = h
        .store
        .snapshot_entity(EntityKind::Repository, Window::Daily, 1)
        .await
        .unwrap()
        .unwrap();
    assert!(first.entity.summary.is_some());
    assert!(first.entity.tags.is_empty());
}

#[tokio::test]
async fn test_fetch_failure_keeps_previous_listing() {
    let h = daily_repos().await;

    let report = h.orchestrator.run_once().await;
    let w = &report.windows[0];
    assert!(w.fetch_failed && w.degraded);
    assert_eq!(w.extracted, 0);
    assert_eq!(h.store.count_entities().await.unwrap(), 0);

    h.source.set_page(BASE, "daily", repo_listing(5));
    assert!(!h.orchestrator.run_once().await.is_degraded());

    h.source.set_error("network unreachable");
    let report = h.orchestrator.run_once().await;
    assert!(report.is_degraded());
    assert_eq!(h.store.count_snapshots().await.unwrap(), 5);
    assert_eq!(h.augmenter.summary_calls(), 5);

    h.source.clear_error();
    assert!(!h.orchestrator.run_once().await.is_degraded());
}

#[tokio::test]
async fn test_shrinking_listing_prunes_tail() {
    let h = daily_repos().await;
    h.source.set_page(BASE, "daily", repo_listing(5));
    h.orchestrator.run_once().await;

    h.source.set_page(BASE, "daily", repo_listing(3));
    let report = h.orchestrator.run_once().await;
    assert_eq!(report.windows[0].pruned, 2);

    let listing = h.store.current_listing(EntityKind::Repository, Window::Daily).await.unwrap();
    assert_eq!(listing.len(), 3);
    assert_eq!(h.store.count_snapshots().await.unwrap(), 3);
}

#[tokio::test]
async fn test_reordered_listing_relinks_ranks() {
    let h = daily_repos().await;
    let a = repo_item("org", "alpha", "10");
    let b = repo_item("org", "beta", "20");
    let c = repo_item("org", "gamma", "30");

    h.source.set_page(BASE, "daily", page(&[a.clone(), b.clone(), c.clone()]));
    h.orchestrator.run_once().await;

    h.source.set_page(BASE, "daily", page(&[c, a, b]));
    let report = h.orchestrator.run_once().await;
    assert_eq!(report.windows[0].reused, 3);

    let listing = h.store.current_listing(EntityKind::Repository, Window::Daily).await.unwrap();
    let order: Vec<(&str, u32)> = listing
        .iter()
        .map(|s| (s.entity.identity.as_str(), s.entity.rank))
        .collect();
    assert_eq!(order, vec![("org/gamma", 1), ("org/alpha", 2), ("org/beta", 3)]);
    assert_eq!(h.store.count_entities().await.unwrap(), 3);
    assert_eq!(h.augmenter.summary_calls(), 3);
}

#[tokio::test]
async fn test_windows_are_stored_independently() {
    let h = harness(
        vec![EntityKind::Repository],
        vec![Window::Daily, Window::Weekly],
        Duration::from_secs(3600),
    )
    .await;
    h.source.set_page(BASE, "daily", repo_listing(2));
    h.source.set_page(BASE, "weekly", repo_listing(3));

    let report = h.orchestrator.run_once().await;
    assert_eq!(report.windows.len(), 2);
    assert!(!report.is_degraded());
    assert_eq!(h.store.count_entities().await.unwrap(), 5);

    let weekly = h.store.current_listing(EntityKind::Repository, Window::Weekly).await.unwrap();
    assert_eq!(weekly.len(), 3);
    assert!(weekly.iter().all(|s| s.entity.window == Some(Window::Weekly)));
}

#[tokio::test]
async fn test_developer_listing() {
    let h = harness(
        vec![EntityKind::Repository, EntityKind::Developer],
        vec![Window::Daily],
        Duration::from_secs(3600),
    )
    .await;
    h.source.set_page(BASE, "daily", repo_listing(1));
    h.source.set_page(DEVELOPERS, "daily", page(&[dev_item("alice", "Alice"), dev_item("bob", "Bob")]));

    let report = h.orchestrator.run_once().await;
    assert!(!report.is_degraded());
    assert!(h.source.requests().contains(&format!("{DEVELOPERS}?since=daily")));

    let devs = h.store.current_listing(EntityKind::Developer, Window::Daily).await.unwrap();
    assert_eq!(devs.len(), 2);
    assert_eq!(devs[0].entity.identity, "alice");
    assert_eq!(devs[0].entity.display_name.as_deref(), Some("Alice"));
    assert_eq!(devs[1].entity.tags, vec!["trending", "developer"]);
    assert_eq!(h.store.current_listing(EntityKind::Repository, Window::Daily).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_expired_entities_are_replaced() {
    let h = harness(vec![EntityKind::Repository], vec![Window::Daily], Duration::ZERO).await;
    h.source.set_page(BASE, "daily", repo_listing(3));

    h.orchestrator.run_once().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let report = h.orchestrator.run_once().await;

    assert_eq!(report.windows[0].refreshed, 3);
    assert_eq!(h.augmenter.summary_calls(), 6);
    assert_eq!(h.store.count_entities().await.unwrap(), 3);
    assert_eq!(h.store.count_snapshots().await.unwrap(), 3);
}

#[tokio::test]
async fn test_run_loop_backs_off_and_cancels() {
    let h = daily_repos().await;
    let orchestrator = Arc::new(h.orchestrator);
    let cancel = orchestrator.cancel_flag();

    let handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run().await }
    });

    // Every run fails to fetch, so the loop retries on the short backoff.
    while h.source.requests().len() < 3 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run loop did not stop")
        .unwrap();
    assert_eq!(h.store.count_entities().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_commit_after_reorder_leaves_no_duplicate_links() {
    let source = Arc::new(MockSource::new());
    let augmenter = Arc::new(ScriptedAugmenter::new());
    let sqlite = Arc::new(SqliteStore::in_memory().await.unwrap());
    let store = Arc::new(FailingStore::new(sqlite.clone()));
    let orchestrator = Orchestrator::new(
        source.clone(),
        augmenter,
        store.clone(),
        config(vec![EntityKind::Repository], vec![Window::Daily], Duration::from_secs(3600)),
    );

    let a = repo_item("org", "a", "1");
    let b = repo_item("org", "b", "2");
    let c = repo_item("org", "c", "3");
    source.set_page(BASE, "daily", page(&[a.clone(), b.clone(), c.clone()]));
    assert!(!orchestrator.run_once().await.is_degraded());

    // `c` moves up to rank 1; the entity taking over rank 3 fails to commit.
    source.set_page(BASE, "daily", page(&[c, a, b]));
    store.fail_commit_at(3);
    let report = orchestrator.run_once().await;
    let w = &report.windows[0];
    assert!(w.degraded);
    assert_eq!(w.failed, 1);

    let listing = sqlite.current_listing(EntityKind::Repository, Window::Daily).await.unwrap();
    let linked: Vec<(&str, u32)> = listing
        .iter()
        .map(|s| (s.entity.identity.as_str(), s.entity.rank))
        .collect();
    assert_eq!(linked, vec![("org/c", 1), ("org/a", 2)]);

    let mut ids: Vec<i64> = listing.iter().map(|s| s.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), listing.len());
}

#[tokio::test]
async fn test_panicking_run_backs_off_and_retries() {
    let source = Arc::new(MockSource::new());
    let augmenter = Arc::new(PanickingAugmenter::new());
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    source.set_page(BASE, "daily", repo_listing(2));

    // A six hour refresh interval: only the backoff path can produce repeat runs.
    let orchestrator = Arc::new(Orchestrator::new(
        source.clone(),
        augmenter.clone(),
        store.clone(),
        config(vec![EntityKind::Repository], vec![Window::Daily], Duration::from_secs(6 * 3600)),
    ));
    let cancel = orchestrator.cancel_flag();
    let handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.run().await }
    });

    while augmenter.calls() < 3 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run loop did not stop")
        .expect("run loop task panicked");

    // Each run panicked on the first entity, before anything was committed.
    assert!(source.requests().len() >= 3);
    assert_eq!(store.count_entities().await.unwrap(), 0);
}
