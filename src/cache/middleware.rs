//! Cache-aside middleware around a streaming model call.

use super::backend::StreamStore;
use super::config::CacheConfig;
use super::key::{CacheKey, CacheKeyGenerator};
use super::replay::{record_stream, replay_stream};
use crate::classifier::RequestClassifier;
use crate::invoker::{InvocationParams, ModelInvoker};
use crate::types::events::StreamingEvent;
use crate::{EventStream, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Counters for one middleware instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Requests classified as creative (always misses)
    pub creative: u64,
    /// Completed background writes
    pub writes: u64,
    /// Swallowed store or key failures
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    creative: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            creative: self.creative.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Wraps model invocations with a streaming cache.
///
/// One instance per requesting user: the owner id is bound at construction and
/// recorded on every entry this instance writes. Reads are not owner-scoped
/// unless [`CacheConfig::partition_by_owner`] is set.
///
/// Cache failures never reach the caller. A lookup error is a miss, a write
/// error is logged. Only the invoker's own errors propagate.
#[derive(Clone)]
pub struct StreamCacheMiddleware {
    store: Arc<dyn StreamStore>,
    config: CacheConfig,
    classifier: RequestClassifier,
    keys: CacheKeyGenerator,
    owner_id: Option<String>,
    stats: Arc<AtomicStats>,
    writes: TaskTracker,
    shared_writes: Option<TaskTracker>,
}

impl StreamCacheMiddleware {
    pub fn new(store: Arc<dyn StreamStore>, owner_id: Option<String>) -> Self {
        Self::with_config(store, owner_id, CacheConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn StreamStore>,
        owner_id: Option<String>,
        config: CacheConfig,
    ) -> Self {
        let mut keys = CacheKeyGenerator::new().with_format(config.key_format);
        if config.partition_by_owner {
            if let Some(ref owner) = owner_id {
                keys = keys.with_salt(owner.clone());
            }
        }
        Self {
            store,
            config,
            classifier: RequestClassifier::new(),
            keys,
            owner_id,
            stats: Arc::new(AtomicStats::default()),
            writes: TaskTracker::new(),
            shared_writes: None,
        }
    }

    pub fn with_classifier(mut self, classifier: RequestClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Also register background writes on an owner's tracker (used by
    /// `CacheService`, which waits on it at shutdown). That tracker is never
    /// closed or reopened from here.
    pub(crate) fn with_shared_tracker(mut self, tracker: TaskTracker) -> Self {
        self.shared_writes = Some(tracker);
        self
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StreamStore> {
        &self.store
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    /// Key this middleware would use for `params`.
    pub fn cache_key(&self, params: &InvocationParams) -> Result<CacheKey> {
        let creative = self.classifier.is_creative(&params.prompt);
        self.keys.generate(params, creative)
    }

    /// Wait until every background write started by this middleware (and its
    /// clones) has finished.
    ///
    /// The request path never calls this. A shared service tracker is left
    /// untouched, so this is safe to call while `CacheService::shutdown` runs.
    pub async fn flush_pending_writes(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }

    /// Serve `params` from cache, or call `do_invoke` and record its output.
    pub async fn wrap_stream<F, Fut>(&self, params: InvocationParams, do_invoke: F) -> Result<EventStream>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<EventStream>> + Send,
    {
        self.wrap_stream_with_cancel(params, do_invoke, CancellationToken::new())
            .await
    }

    /// Like [`wrap_stream`](Self::wrap_stream), tied to the caller's connection.
    ///
    /// Cancelling `cancel` ends the returned stream, drops the live upstream
    /// stream, and discards whatever was buffered so far.
    pub async fn wrap_stream_with_cancel<F, Fut>(
        &self,
        params: InvocationParams,
        do_invoke: F,
        cancel: CancellationToken,
    ) -> Result<EventStream>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<EventStream>> + Send,
    {
        if !self.config.enabled {
            return do_invoke().await;
        }

        let key = match self.cache_key(&params) {
            Ok(key) => key,
            Err(e) => {
                AtomicStats::bump(&self.stats.errors);
                warn!(error = %e, "cache key generation failed, bypassing cache");
                return do_invoke().await;
            }
        };
        if key.creative {
            AtomicStats::bump(&self.stats.creative);
        }

        match self.store.get(key.as_str()).await {
            Ok(Some(events)) => {
                AtomicStats::bump(&self.stats.hits);
                debug!(
                    store = self.store.name(),
                    owner = ?self.owner_id,
                    events = events.len(),
                    "stream cache hit, replaying"
                );
                return Ok(replay_stream(events, self.config.replay, cancel));
            }
            Ok(None) => {
                AtomicStats::bump(&self.stats.misses);
                debug!(
                    store = self.store.name(),
                    owner = ?self.owner_id,
                    creative = key.creative,
                    "stream cache miss"
                );
            }
            Err(e) => {
                AtomicStats::bump(&self.stats.misses);
                AtomicStats::bump(&self.stats.errors);
                warn!(
                    store = self.store.name(),
                    error = %e,
                    "stream cache lookup failed, treating as miss"
                );
            }
        }

        let upstream = do_invoke().await?;
        let on_complete = self.background_writer(key);
        Ok(record_stream(upstream, cancel, on_complete))
    }

    /// Detached store write for a completed live stream. The caller's stream
    /// has already ended when this runs; errors are logged only.
    fn background_writer(&self, key: CacheKey) -> impl FnOnce(Vec<StreamingEvent>) + Send + 'static {
        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);
        let writes = self.writes.clone();
        let shared_writes = self.shared_writes.clone();
        let owner_id = self.owner_id.clone();
        let ttl: Duration = self.config.ttl;

        move |events: Vec<StreamingEvent>| {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                warn!("no tokio runtime available, completed stream not cached");
                return;
            };
            let count = events.len();
            let write = writes.track_future(async move {
                match store.set(key.as_str(), events, ttl, owner_id.as_deref()).await {
                    Ok(()) => {
                        AtomicStats::bump(&stats.writes);
                        debug!(store = store.name(), events = count, "stream cached");
                    }
                    Err(e) => {
                        AtomicStats::bump(&stats.errors);
                        warn!(store = store.name(), error = %e, "failed to cache stream");
                    }
                }
            });
            match shared_writes {
                Some(shared) => handle.spawn(shared.track_future(write)),
                None => handle.spawn(write),
            };
        }
    }
}

/// A [`ModelInvoker`] whose calls go through a [`StreamCacheMiddleware`].
pub struct CachedInvoker<I: ?Sized> {
    inner: Arc<I>,
    cache: StreamCacheMiddleware,
}

impl<I: ModelInvoker + ?Sized> CachedInvoker<I> {
    pub fn new(inner: Arc<I>, cache: StreamCacheMiddleware) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &StreamCacheMiddleware {
        &self.cache
    }
}

#[async_trait]
impl<I: ModelInvoker + ?Sized + 'static> ModelInvoker for CachedInvoker<I> {
    async fn invoke(&self, params: InvocationParams) -> Result<EventStream> {
        let inner = Arc::clone(&self.inner);
        let upstream_params = params.clone();
        self.cache
            .wrap_stream(params, move || async move { inner.invoke(upstream_params).await })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
