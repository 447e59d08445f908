//! Process-level owner of the shared stream store.

use super::backend::{StoreStats, StreamStore};
use super::config::CacheConfig;
use super::maintenance::CleanupTask;
use super::middleware::StreamCacheMiddleware;
use crate::Result;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::info;

/// Shared cache state for an application.
///
/// Create one at startup, hand out per-user middleware with
/// [`middleware_for`](Self::middleware_for), and call
/// [`shutdown`](Self::shutdown) before exit so the sweep stops and in-flight
/// writes land.
pub struct CacheService {
    store: Arc<dyn StreamStore>,
    config: CacheConfig,
    cleanup: Option<CleanupTask>,
    writes: TaskTracker,
}

impl CacheService {
    /// Start the service. Must run inside a tokio runtime; spawns the
    /// periodic cleanup when caching is enabled.
    pub fn start(store: Arc<dyn StreamStore>, config: CacheConfig) -> Self {
        let cleanup = config
            .enabled
            .then(|| CleanupTask::spawn(Arc::clone(&store), config.cleanup_interval));
        info!(
            store = store.name(),
            enabled = config.enabled,
            ttl_secs = config.ttl.as_secs(),
            "stream cache started"
        );
        Self {
            store,
            config,
            cleanup,
            writes: TaskTracker::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn StreamStore> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Middleware bound to one requesting user.
    pub fn middleware_for(&self, owner_id: Option<String>) -> StreamCacheMiddleware {
        StreamCacheMiddleware::with_config(Arc::clone(&self.store), owner_id, self.config.clone())
            .with_shared_tracker(self.writes.clone())
    }

    /// Run an expiry sweep now, outside the regular schedule.
    pub async fn cleanup_now(&self) -> Result<usize> {
        self.store.cleanup().await
    }

    pub async fn stats(&self, owner_id: Option<&str>) -> Result<StoreStats> {
        self.store.stats(owner_id).await
    }

    pub async fn clear(&self, owner_id: Option<&str>) -> Result<()> {
        self.store.clear(owner_id).await
    }

    pub async fn shutdown(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.shutdown().await;
        }
        self.writes.close();
        self.writes.wait().await;
        info!(store = self.store.name(), "stream cache stopped");
    }
}
