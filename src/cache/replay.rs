//! Stream adapters used by the middleware: cached replay and live recording.

use super::config::ReplayTiming;
use crate::types::events::StreamingEvent;
use crate::EventStream;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

/// Replay stored events in order, pacing them like a live stream.
///
/// The first event waits `initial_delay`, every later one `chunk_delay`.
/// Cancellation ends the stream at the next event boundary.
pub fn replay_stream(
    events: Vec<StreamingEvent>,
    timing: ReplayTiming,
    cancel: CancellationToken,
) -> EventStream {
    stream::unfold(
        (events.into_iter(), true, cancel),
        move |(mut events, first, cancel)| async move {
            let event = events.next()?;
            let delay = if first {
                timing.initial_delay
            } else {
                timing.chunk_delay
            };
            if delay.is_zero() {
                if cancel.is_cancelled() {
                    return None;
                }
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Some((Ok(event), (events, false, cancel)))
        },
    )
    .boxed()
}

struct Recording<F> {
    upstream: EventStream,
    buffer: Vec<StreamingEvent>,
    cacheable: bool,
    on_complete: Option<F>,
    cancel: CancellationToken,
}

/// Forward `upstream` untouched while buffering a copy of every event.
///
/// `on_complete` receives the buffer only when the upstream ends normally and
/// the sequence is worth storing: no error items, no in-band error events, not
/// empty. Cancellation drops the upstream and the buffer; so does dropping
/// the returned stream early.
pub fn record_stream<F>(upstream: EventStream, cancel: CancellationToken, on_complete: F) -> EventStream
where
    F: FnOnce(Vec<StreamingEvent>) + Send + 'static,
{
    let state = Recording {
        upstream,
        buffer: Vec::new(),
        cacheable: true,
        on_complete: Some(on_complete),
        cancel,
    };

    stream::unfold(state, |mut state| async move {
        let next = tokio::select! {
            biased;
            _ = state.cancel.cancelled() => {
                tracing::debug!(
                    buffered = state.buffer.len(),
                    "live stream cancelled, discarding buffered events"
                );
                return None;
            }
            next = state.upstream.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                if state.cacheable {
                    if event.is_error() {
                        state.cacheable = false;
                        state.buffer = Vec::new();
                    } else {
                        state.buffer.push(event.clone());
                    }
                }
                Some((Ok(event), state))
            }
            Some(Err(e)) => {
                state.cacheable = false;
                state.buffer = Vec::new();
                Some((Err(e), state))
            }
            None => {
                if state.cacheable && !state.buffer.is_empty() {
                    if let Some(f) = state.on_complete.take() {
                        f(std::mem::take(&mut state.buffer));
                    }
                }
                None
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::events::Usage;
    use crate::Error;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    fn events() -> Vec<StreamingEvent> {
        vec![
            StreamingEvent::text_delta("a"),
            StreamingEvent::text_delta("b"),
            StreamingEvent::text_delta("c"),
            StreamingEvent::finish("stop", Usage::new(1, 3)),
        ]
    }

    fn upstream(items: Vec<crate::Result<StreamingEvent>>) -> EventStream {
        stream::iter(items).boxed()
    }

    type Captured = Arc<Mutex<Option<Vec<StreamingEvent>>>>;

    fn capture() -> (Captured, impl FnOnce(Vec<StreamingEvent>) + Send + 'static) {
        let slot: Captured = Arc::new(Mutex::new(None));
        let writer = Arc::clone(&slot);
        (slot, move |evs| {
            *writer.lock().unwrap() = Some(evs);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn replay_paces_events() {
        let start = Instant::now();
        let mut s = replay_stream(events(), ReplayTiming::default(), CancellationToken::new());

        let first = s.next().await.unwrap().unwrap();
        assert_eq!(first, StreamingEvent::text_delta("a"));
        let to_first = start.elapsed();
        assert!(to_first >= Duration::from_millis(20), "{:?}", to_first);
        assert!(to_first < Duration::from_millis(23), "{:?}", to_first);

        let rest: Vec<_> = s.map(|r| r.unwrap()).collect().await;
        assert_eq!(rest.len(), 3);
        let total = start.elapsed();
        assert!(total >= Duration::from_millis(29), "{:?}", total);
        assert!(total < Duration::from_millis(35), "{:?}", total);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let mut s = replay_stream(events(), ReplayTiming::default(), cancel.clone());
        assert!(s.next().await.is_some());
        cancel.cancel();
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn recording_forwards_and_buffers_in_order() {
        let (slot, on_complete) = capture();
        let s = record_stream(
            upstream(events().into_iter().map(Ok).collect()),
            CancellationToken::new(),
            on_complete,
        );
        let out: Vec<_> = s.map(|r| r.unwrap()).collect().await;
        assert_eq!(out, events());
        assert_eq!(slot.lock().unwrap().clone(), Some(events()));
    }

    #[tokio::test]
    async fn upstream_error_is_forwarded_and_not_recorded() {
        let (slot, on_complete) = capture();
        let s = record_stream(
            upstream(vec![
                Ok(StreamingEvent::text_delta("a")),
                Err(Error::invocation("connection reset")),
                Ok(StreamingEvent::text_delta("b")),
            ]),
            CancellationToken::new(),
            on_complete,
        );
        let out: Vec<_> = s.collect().await;
        assert_eq!(out.len(), 3);
        assert!(matches!(out[1], Err(Error::Invocation { .. })));
        assert!(slot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn in_band_error_event_is_not_recorded() {
        let (slot, on_complete) = capture();
        let s = record_stream(
            upstream(vec![
                Ok(StreamingEvent::text_delta("a")),
                Ok(StreamingEvent::error("rate limited")),
            ]),
            CancellationToken::new(),
            on_complete,
        );
        assert_eq!(s.count().await, 2);
        assert!(slot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_stream_is_not_recorded() {
        let (slot, on_complete) = capture();
        let s = record_stream(upstream(vec![]), CancellationToken::new(), on_complete);
        assert_eq!(s.count().await, 0);
        assert!(slot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn cancellation_discards_partial_buffer() {
        let (slot, on_complete) = capture();
        let cancel = CancellationToken::new();
        let mut s = record_stream(
            upstream(events().into_iter().map(Ok).collect()),
            cancel.clone(),
            on_complete,
        );
        assert!(s.next().await.is_some());
        cancel.cancel();
        assert!(s.next().await.is_none());
        assert!(slot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn dropping_early_discards_partial_buffer() {
        let (slot, on_complete) = capture();
        let mut s = record_stream(
            upstream(events().into_iter().map(Ok).collect()),
            CancellationToken::new(),
            on_complete,
        );
        assert!(s.next().await.is_some());
        drop(s);
        assert!(slot.lock().unwrap().is_none());
    }
}
