//! Stream store contract and in-process backends.

use crate::types::events::StreamingEvent;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// A persisted cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<StreamingEvent>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Entry counts, optionally scoped to one owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
}

/// Persistence backend for buffered event sequences.
///
/// Contract:
/// - `get` returns `Ok(None)` for missing *and* for expired keys; errors are
///   reserved for backend failures.
/// - `set` upserts and sets the expiry to `now + ttl`.
/// - `delete` is idempotent; it reports whether something was removed.
/// - `cleanup` physically removes expired entries and returns how many.
/// - `size` counts unexpired entries.
///
/// `owner_id` never restricts reads; it only scopes `clear`, `size` and `stats`.
#[async_trait]
pub trait StreamStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<StreamingEvent>>>;
    async fn set(
        &self,
        key: &str,
        events: Vec<StreamingEvent>,
        ttl: Duration,
        owner_id: Option<&str>,
    ) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn cleanup(&self) -> Result<usize>;
    async fn clear(&self, owner_id: Option<&str>) -> Result<()>;
    async fn size(&self, owner_id: Option<&str>) -> Result<usize>;
    async fn stats(&self, owner_id: Option<&str>) -> Result<StoreStats>;
    fn name(&self) -> &'static str;
}

/// Longest lifetime or period the in-process timers honour; anything longer
/// is treated as this.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + ttl`, saturating at [`FAR_FUTURE`] instead of overflowing.
pub(crate) fn deadline_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(FAR_FUTURE)).unwrap_or_else(|| now + FAR_FUTURE)
}

struct MemoryEntry {
    events: Vec<StreamingEvent>,
    expires_at: Instant,
    owner_id: Option<String>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    fn owned_by(&self, owner_id: Option<&str>) -> bool {
        match owner_id {
            Some(o) => self.owner_id.as_deref() == Some(o),
            None => true,
        }
    }
}

/// In-memory store.
///
/// Expiry uses `tokio::time::Instant`, so it follows paused or advanced time in
/// tests. Expired entries stay in the map until [`StreamStore::cleanup`].
pub struct MemoryStreamStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStreamStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<StreamingEvent>>> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(Instant::now()))
            .map(|e| e.events.clone()))
    }

    async fn set(
        &self,
        key: &str,
        events: Vec<StreamingEvent>,
        ttl: Duration,
        owner_id: Option<&str>,
    ) -> Result<()> {
        let entry = MemoryEntry {
            events,
            expires_at: deadline_after(Instant::now(), ttl),
            owner_id: owner_id.map(str::to_string),
        };
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn cleanup(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        Ok(before - entries.len())
    }

    async fn clear(&self, owner_id: Option<&str>) -> Result<()> {
        let mut entries = self.entries.write();
        match owner_id {
            Some(_) => entries.retain(|_, e| !e.owned_by(owner_id)),
            None => entries.clear(),
        }
        Ok(())
    }

    async fn size(&self, owner_id: Option<&str>) -> Result<usize> {
        Ok(self.stats(owner_id).await?.active)
    }

    async fn stats(&self, owner_id: Option<&str>) -> Result<StoreStats> {
        let now = Instant::now();
        let entries = self.entries.read();
        let mut stats = StoreStats::default();
        for e in entries.values().filter(|e| e.owned_by(owner_id)) {
            stats.total += 1;
            if e.is_expired(now) {
                stats.expired += 1;
            } else {
                stats.active += 1;
            }
        }
        Ok(stats)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Store that never keeps anything; every lookup misses.
pub struct NullStreamStore;

impl NullStreamStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullStreamStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamStore for NullStreamStore {
    async fn get(&self, _: &str) -> Result<Option<Vec<StreamingEvent>>> {
        Ok(None)
    }
    async fn set(
        &self,
        _: &str,
        _: Vec<StreamingEvent>,
        _: Duration,
        _: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &str) -> Result<bool> {
        Ok(false)
    }
    async fn cleanup(&self) -> Result<usize> {
        Ok(0)
    }
    async fn clear(&self, _: Option<&str>) -> Result<()> {
        Ok(())
    }
    async fn size(&self, _: Option<&str>) -> Result<usize> {
        Ok(0)
    }
    async fn stats(&self, _: Option<&str>) -> Result<StoreStats> {
        Ok(StoreStats::default())
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
