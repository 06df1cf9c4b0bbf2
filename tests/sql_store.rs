//! Integration tests for the relational store against SQLite files.
//!
//! Each test creates its own database in a temporary directory.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::Span;

use influss::clip::Clip;
use influss::storage::{open_store, SqlStore, Store, StoreConfig, StoreError, BUNDLED_MIGRATIONS};

fn clip(url: &str, title: &str) -> Clip {
    let modified_at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
    Clip {
        url: url.to_string(),
        title: title.to_string(),
        author: "Author".to_string(),
        published_at: modified_at,
        modified_at,
        excerpt: format!("Excerpt of {title}"),
        html_content: format!("<p>{title}</p>"),
        plain_text_content: title.to_string(),
    }
}

fn connection_string(dir: &tempfile::TempDir) -> String {
    format!("sqlite3://{}", dir.path().join("clips.db").display())
}

async fn open(dir: &tempfile::TempDir) -> SqlStore {
    SqlStore::open(Span::none(), &connection_string(dir))
        .await
        .unwrap()
}

async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

async fn count(store: &SqlStore, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

fn titles(clips: &[Clip]) -> Vec<&str> {
    clips.iter().map(|c| c.title.as_str()).collect()
}

// ============================================================================
// Open and Migrate
// ============================================================================

#[tokio::test]
async fn test_open_creates_schema() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;

    assert_eq!(count(&store, "SELECT COUNT(*) FROM clip").await, 0);
    assert_eq!(
        count(&store, "SELECT COUNT(*) FROM schema_migration").await,
        BUNDLED_MIGRATIONS.len() as i64
    );
}

#[tokio::test]
async fn test_reopen_applies_no_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let first = open(&dir).await;
    first.store(&clip("https://example.com/a", "A")).await.unwrap();
    let ledger = count(&first, "SELECT COUNT(*) FROM schema_migration").await;
    first.pool().close().await;

    let second = open(&dir).await;
    assert_eq!(
        count(&second, "SELECT COUNT(*) FROM schema_migration").await,
        ledger
    );
    assert_eq!(titles(&second.load(10).await), vec!["A"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opens_share_one_schema() {
    let dir = tempfile::tempdir().unwrap();
    let conn = connection_string(&dir);

    let opens: Vec<_> = (0..4)
        .map(|_| {
            let conn = conn.clone();
            tokio::spawn(async move { SqlStore::open(Span::none(), &conn).await })
        })
        .collect();

    let mut stores = Vec::new();
    for open in opens {
        stores.push(open.await.unwrap().unwrap());
    }

    assert_eq!(
        count(&stores[0], "SELECT COUNT(*) FROM schema_migration").await,
        BUNDLED_MIGRATIONS.len() as i64
    );
    stores[1].store(&clip("https://example.com/a", "A")).await.unwrap();
    assert_eq!(titles(&stores[2].load(10).await), vec!["A"]);
}

#[tokio::test]
async fn test_created_at_comes_from_first_migration() {
    let dir = tempfile::tempdir().unwrap();
    let before = Utc::now() - chrono::Duration::seconds(5);
    let store = open(&dir).await;

    let created_at = store.created_at().await;
    assert_ne!(created_at, DateTime::<Utc>::default());
    assert!(created_at >= before, "{created_at} < {before}");
}

#[tokio::test]
async fn test_unsupported_scheme_is_configuration_error() {
    for conn in ["mysql://localhost/clips", "sqlite3://", "clips.db"] {
        let result = open_store(&StoreConfig::Sql(conn.to_string()), Span::none()).await;
        assert!(
            matches!(result, Err(StoreError::Configuration(_))),
            "{conn} should be rejected"
        );
    }
}

// ============================================================================
// Store and Load
// ============================================================================

#[tokio::test]
async fn test_upsert_keeps_one_row_with_latest_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    let url = "https://example.com/same";

    store.store(&clip(url, "Old")).await.unwrap();
    tick().await;
    store.store(&clip(url, "New")).await.unwrap();

    assert_eq!(count(&store, "SELECT COUNT(*) FROM clip").await, 1);
    let clips = store.load(10).await;
    assert_eq!(titles(&clips), vec!["New"]);
    assert_eq!(clips[0].html_content, "<p>New</p>");
    assert_eq!(clips[0].excerpt, "Excerpt of New");
}

#[tokio::test]
async fn test_load_round_trips_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    let original = clip("https://example.com/a", "A");

    store.store(&original).await.unwrap();
    let loaded = store.load(1).await;

    // Plain text is persisted but never loaded back
    let expected = Clip {
        plain_text_content: String::new(),
        ..original
    };
    assert_eq!(loaded, vec![expected]);
}

#[tokio::test]
async fn test_recency_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;

    for title in ["first", "second", "third"] {
        store
            .store(&clip(&format!("https://example.com/{title}"), title))
            .await
            .unwrap();
        tick().await;
    }

    assert_eq!(titles(&store.load(2).await), vec!["third", "second"]);
    assert_eq!(
        titles(&store.load(10).await),
        vec!["third", "second", "first"]
    );
}

#[tokio::test]
async fn test_load_never_exceeds_request() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir).await;
    for i in 0..3 {
        store
            .store(&clip(&format!("https://example.com/{i}"), "x"))
            .await
            .unwrap();
    }

    for limit in 0..=5 {
        assert_eq!(store.load(limit).await.len(), limit.min(3), "limit {limit}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stores() {
    const N: usize = 16;
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(open(&dir).await);

    let tasks: Vec<_> = (0..N)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let url = format!("https://example.com/concurrent/{i}");
                store.store(&clip(&url, &format!("clip {i}"))).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let urls: HashSet<String> = store.load(N).await.into_iter().map(|c| c.url).collect();
    assert_eq!(urls.len(), N);
}
