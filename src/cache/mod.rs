//! # Stream Cache Module
//!
//! Cache-aside for streamed model output. A request is fingerprinted, looked up
//! in a [`StreamStore`], and either replayed from the stored event sequence or
//! passed to the real model while a copy of its events is recorded.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`StreamCacheMiddleware`] | Wraps one model call: lookup, replay or record |
//! | [`CachedInvoker`] | [`ModelInvoker`](crate::ModelInvoker) adapter over the middleware |
//! | [`CacheService`] | Owns the shared store, cleanup task and pending writes |
//! | [`CacheConfig`] | TTL, replay pacing, sweep interval, key options |
//! | [`StreamStore`] | Trait for persistence backends |
//! | [`MemoryStreamStore`] | In-process map |
//! | `SqliteStreamStore` | SQLite table (feature `sqlite`) |
//! | [`NullStreamStore`] | Stores nothing |
//! | [`CacheKeyGenerator`] | Canonical request fingerprints |
//! | [`CleanupTask`] | Periodic expiry sweep |
//!
//! ## Request Flow
//!
//! ```text
//! wrap_stream(params, invoke)
//!     │
//!     ├─ classify ── creative? ── key gets a unique suffix
//!     ├─ store.get(key)
//!     │     ├─ hit  ──► replay stored events (20ms, then 3ms apart)
//!     │     └─ miss ──► invoke() ──► forward live events ──► caller
//!     │                                  │
//!     │                                  └─ buffer ── on completion ──► store.set (background)
//!     └─ lookup error = miss; write error = log only
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ai_stream_cache::cache::{CacheConfig, MemoryStreamStore, StreamCacheMiddleware};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = CacheConfig::default().with_ttl(Duration::from_secs(600));
//! let cache = StreamCacheMiddleware::with_config(
//!     Arc::new(MemoryStreamStore::new()),
//!     Some("user-42".to_string()),
//!     config,
//! );
//! assert_eq!(cache.owner_id(), Some("user-42"));
//! ```

mod backend;
mod config;
mod key;
mod maintenance;
mod middleware;
mod replay;
mod service;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use backend::{CacheEntry, MemoryStreamStore, NullStreamStore, StoreStats, StreamStore};
pub use config::{
    CacheConfig, ReplayTiming, DEFAULT_CLEANUP_INTERVAL, DEFAULT_REPLAY_CHUNK_DELAY,
    DEFAULT_REPLAY_INITIAL_DELAY, DEFAULT_TTL,
};
pub use key::{CacheKey, CacheKeyGenerator, KeyFormat};
pub use maintenance::CleanupTask;
pub use middleware::{CacheStats, CachedInvoker, StreamCacheMiddleware};
pub use replay::{record_stream, replay_stream};
pub use service::CacheService;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStreamStore;
