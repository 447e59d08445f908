//! Background expiry sweep.

use super::backend::{deadline_after, StreamStore, FAR_FUTURE};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodically calls [`StreamStore::cleanup`].
///
/// The first sweep happens one interval after spawning. Dropping the task
/// stops it; [`shutdown`](Self::shutdown) also waits for it to finish.
pub struct CleanupTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    pub fn spawn(store: Arc<dyn StreamStore>, interval: Duration) -> Self {
        // tokio intervals panic on a zero period and on deadline overflow
        let interval = interval.clamp(Duration::from_millis(1), FAR_FUTURE);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let start = deadline_after(Instant::now(), interval);
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match store.cleanup().await {
                    Ok(0) => debug!(store = store.name(), "stream cache sweep found nothing expired"),
                    Ok(removed) => info!(
                        store = store.name(),
                        removed,
                        "removed expired stream cache entries"
                    ),
                    Err(e) => warn!(store = store.name(), error = %e, "stream cache sweep failed"),
                }
            }
            debug!("stream cache cleanup stopped");
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "stream cache cleanup task ended abnormally");
            }
        }
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryStreamStore;
    use crate::types::events::StreamingEvent;

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_interval() {
        let store = Arc::new(MemoryStreamStore::new());
        store
            .set(
                "k",
                vec![StreamingEvent::text_delta("x")],
                Duration::from_secs(1),
                None,
            )
            .await
            .unwrap();

        let task = CleanupTask::spawn(store.clone(), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.stats(None).await.unwrap().expired, 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(store.stats(None).await.unwrap().total, 0);

        assert!(task.is_running());
        task.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_interval_keeps_the_task_alive() {
        let store = Arc::new(MemoryStreamStore::new());
        let task = CleanupTask::spawn(store.clone(), Duration::MAX);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(task.is_running());
        task.shutdown().await;

        let task = CleanupTask::spawn(store, Duration::from_secs(u64::MAX));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(task.is_running());
        task.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let task = CleanupTask::spawn(Arc::new(MemoryStreamStore::new()), Duration::from_secs(3600));
        assert!(task.is_running());
        task.shutdown().await;
    }
}
