#![cfg(feature = "sqlite")]

use ai_stream_cache::cache::{
    CacheConfig, CacheService, ReplayTiming, SqliteStreamStore, StoreStats, StreamStore,
};
use ai_stream_cache::{EventStream, InvocationParams, Message, StreamingEvent, Usage};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const HOUR: Duration = Duration::from_secs(3600);

fn events(text: &str) -> Vec<StreamingEvent> {
    vec![
        StreamingEvent::text_delta(text),
        StreamingEvent::finish("stop", Usage::new(3, 1)),
    ]
}

/// Unique database path under the system temp dir, removed on drop.
struct TempDb(PathBuf);

impl TempDb {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!(
            "ai-stream-cache-test-{}/cache.db",
            uuid::Uuid::new_v4()
        )))
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        if let Some(dir) = self.0.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

#[tokio::test]
async fn entries_survive_reopening_the_file() {
    let db = TempDb::new();
    {
        let store = SqliteStreamStore::open(&db.0).unwrap();
        assert_eq!(store.path(), Some(db.0.as_path()));
        store
            .set("k1", events("persisted"), HOUR, Some("u1"))
            .await
            .unwrap();
    }

    let reopened = SqliteStreamStore::open(&db.0).unwrap();
    assert_eq!(reopened.get("k1").await.unwrap(), Some(events("persisted")));
    assert_eq!(reopened.size(Some("u1")).await.unwrap(), 1);
}

#[tokio::test]
async fn set_replaces_value_and_owner() {
    let store = SqliteStreamStore::open_in_memory().unwrap();
    store.set("k", events("old"), HOUR, Some("u1")).await.unwrap();
    store.set("k", events("new"), HOUR, Some("u2")).await.unwrap();

    assert_eq!(store.get("k").await.unwrap(), Some(events("new")));
    assert_eq!(store.size(None).await.unwrap(), 1);
    assert_eq!(store.size(Some("u1")).await.unwrap(), 0);
    assert_eq!(store.size(Some("u2")).await.unwrap(), 1);
}

#[tokio::test]
async fn delete_reports_whether_a_row_was_removed() {
    let store = SqliteStreamStore::open_in_memory().unwrap();
    store.set("k", events("x"), HOUR, None).await.unwrap();

    assert!(store.delete("k").await.unwrap());
    assert!(!store.delete("k").await.unwrap());
    assert!(!store.delete("never-there").await.unwrap());
    assert_eq!(store.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn clear_and_stats_scope_by_owner() {
    let store = SqliteStreamStore::open_in_memory().unwrap();
    store.set("a1", events("a"), HOUR, Some("alice")).await.unwrap();
    store.set("a2", events("a"), HOUR, Some("alice")).await.unwrap();
    store.set("b1", events("b"), HOUR, Some("bob")).await.unwrap();
    store.set("anon", events("n"), HOUR, None).await.unwrap();

    assert_eq!(
        store.stats(Some("alice")).await.unwrap(),
        StoreStats {
            total: 2,
            active: 2,
            expired: 0
        }
    );

    store.clear(Some("alice")).await.unwrap();
    assert_eq!(store.size(Some("alice")).await.unwrap(), 0);
    assert_eq!(store.size(None).await.unwrap(), 2);

    store.clear(None).await.unwrap();
    assert_eq!(store.stats(None).await.unwrap(), StoreStats::default());
}

#[tokio::test]
async fn entries_expire_after_their_ttl() {
    let store = SqliteStreamStore::open_in_memory().unwrap();
    store
        .set("short", events("x"), Duration::from_secs(1), None)
        .await
        .unwrap();
    store.set("long", events("y"), HOUR, None).await.unwrap();
    assert!(store.get("short").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(store.get("short").await.unwrap(), None);
    assert_eq!(store.size(None).await.unwrap(), 1);
    let stats = store.stats(None).await.unwrap();
    assert_eq!((stats.total, stats.active, stats.expired), (2, 1, 1));

    assert_eq!(store.cleanup().await.unwrap(), 1);
    assert_eq!(store.cleanup().await.unwrap(), 0);
    assert!(store.entry("short").await.unwrap().is_none());
    assert!(store.get("long").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_do_not_lose_entries() {
    let store = Arc::new(SqliteStreamStore::open_in_memory().unwrap());
    let mut handles = Vec::new();
    for i in 0..32 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let owner = if i % 2 == 0 { "even" } else { "odd" };
            store
                .set(&format!("k{i}"), events(&i.to_string()), HOUR, Some(owner))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.size(None).await.unwrap(), 32);
    assert_eq!(store.size(Some("even")).await.unwrap(), 16);
    assert_eq!(store.get("k7").await.unwrap(), Some(events("7")));
}

#[tokio::test]
async fn service_over_sqlite_serves_repeat_requests_from_disk() {
    let db = TempDb::new();
    let store: Arc<dyn StreamStore> = Arc::new(SqliteStreamStore::open(&db.0).unwrap());
    let service = CacheService::start(
        Arc::clone(&store),
        CacheConfig::default().with_replay(ReplayTiming::immediate()),
    );
    let params = InvocationParams::new(vec![Message::user("how does TCP slow start work")]);

    let alice = service.middleware_for(Some("alice".into()));
    let live: EventStream =
        futures::stream::iter(events("cwnd doubles").into_iter().map(Ok)).boxed();
    let first: Vec<_> = alice
        .wrap_stream(params.clone(), move || async move { Ok(live) })
        .await
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
        .await;
    alice.flush_pending_writes().await;

    let bob = service.middleware_for(Some("bob".into()));
    let second: Vec<_> = bob
        .wrap_stream(params, || async {
            Err::<EventStream, _>(ai_stream_cache::Error::invocation("must not be called"))
        })
        .await
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
        .await;

    assert_eq!(first, second);
    assert_eq!(bob.stats().hits, 1);
    assert_eq!(service.stats(Some("alice")).await.unwrap().active, 1);
    service.shutdown().await;
}

#[test]
fn store_is_usable_from_a_blocking_context() {
    let store = SqliteStreamStore::open_in_memory().unwrap();
    let size = tokio_test::block_on(async {
        store.set("k", events("x"), HOUR, None).await?;
        store.size(None).await
    });
    assert_eq!(size.unwrap(), 1);
}
