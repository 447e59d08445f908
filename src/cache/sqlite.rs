//! SQLite-backed stream store.
//!
//! One row per cache key in the `stream_cache` table. The event sequence is
//! stored as JSON text and timestamps are unix milliseconds. Statements run on
//! tokio's blocking pool so the async callers never block a worker thread.

use super::backend::{CacheEntry, StoreStats, StreamStore};
use crate::types::events::StreamingEvent;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS stream_cache (
    cache_key  TEXT PRIMARY KEY,
    response   TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    user_id    TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stream_cache_expires ON stream_cache(expires_at);
CREATE INDEX IF NOT EXISTS idx_stream_cache_user ON stream_cache(user_id);
";

pub struct SqliteStreamStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStreamStore {
    /// Open (or create) a store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;",
        )?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = ?path, "stream cache database ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Full record for `key`, including expired rows not yet swept.
    pub async fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT response, expires_at, user_id FROM stream_cache WHERE cache_key = ?1",
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    },
                )
                .optional()?;
            let Some((response, expires_at, owner_id)) = row else {
                return Ok(None);
            };
            Ok(Some(CacheEntry {
                value: decode_events(&key, &response)?,
                expires_at: from_millis(expires_at),
                owner_id,
                key,
            }))
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| {
            Error::runtime_with_context(
                "sqlite task did not complete",
                ErrorContext::new()
                    .with_source("sqlite_store")
                    .with_details(e.to_string()),
            )
        })?
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

fn decode_events(key: &str, response: &str) -> Result<Vec<StreamingEvent>> {
    serde_json::from_str(response).map_err(|e| {
        Error::store_with_context(
            "malformed cached response",
            ErrorContext::new()
                .with_source("sqlite_store")
                .with_field_path("stream_cache.response")
                .with_details(format!("key {}: {}", key, e)),
        )
    })
}

#[async_trait]
impl StreamStore for SqliteStreamStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<StreamingEvent>>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let response: Option<String> = conn
                .query_row(
                    "SELECT response FROM stream_cache WHERE cache_key = ?1 AND expires_at > ?2",
                    params![key, now_millis()],
                    |row| row.get(0),
                )
                .optional()?;
            response.map(|r| decode_events(&key, &r)).transpose()
        })
        .await
    }

    async fn set(
        &self,
        key: &str,
        events: Vec<StreamingEvent>,
        ttl: Duration,
        owner_id: Option<&str>,
    ) -> Result<()> {
        let key = key.to_string();
        let owner_id = owner_id.map(str::to_string);
        let response = serde_json::to_string(&events)?;
        self.with_conn(move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO stream_cache (cache_key, response, expires_at, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(cache_key) DO UPDATE SET
                    response   = excluded.response,
                    expires_at = excluded.expires_at,
                    user_id    = excluded.user_id,
                    created_at = excluded.created_at",
                params![
                    key,
                    response,
                    now.saturating_add(ttl_millis(ttl)),
                    owner_id,
                    now
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let n = conn.execute("DELETE FROM stream_cache WHERE cache_key = ?1", params![key])?;
            Ok(n > 0)
        })
        .await
    }

    async fn cleanup(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM stream_cache WHERE expires_at <= ?1",
                params![now_millis()],
            )?;
            Ok(n)
        })
        .await
    }

    async fn clear(&self, owner_id: Option<&str>) -> Result<()> {
        let owner_id = owner_id.map(str::to_string);
        self.with_conn(move |conn| {
            match owner_id {
                Some(o) => conn.execute("DELETE FROM stream_cache WHERE user_id = ?1", params![o])?,
                None => conn.execute("DELETE FROM stream_cache", [])?,
            };
            Ok(())
        })
        .await
    }

    async fn size(&self, owner_id: Option<&str>) -> Result<usize> {
        Ok(self.stats(owner_id).await?.active)
    }

    async fn stats(&self, owner_id: Option<&str>) -> Result<StoreStats> {
        let owner_id = owner_id.map(str::to_string);
        self.with_conn(move |conn| {
            let (total, active): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END), 0)
                 FROM stream_cache
                 WHERE ?2 IS NULL OR user_id = ?2",
                params![now_millis(), owner_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let total = usize::try_from(total).unwrap_or(0);
            let active = usize::try_from(active).unwrap_or(0);
            Ok(StoreStats {
                total,
                active,
                expired: total.saturating_sub(active),
            })
        })
        .await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
