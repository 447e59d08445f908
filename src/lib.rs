//! # ai-stream-cache
//!
//! Cache-aside layer for streamed language-model responses.
//!
//! ## Overview
//!
//! A chat backend usually calls a model provider once per user turn and streams
//! the resulting events (text deltas, tool calls, usage) to the browser. When the
//! same factual question is asked again, re-running the model is wasted cost and
//! latency. This crate wraps the model call with a streaming-aware cache:
//!
//! - **Classification**: requests whose latest turn asks for creative output are
//!   never served from cache ([`classifier`])
//! - **Fingerprinting**: requests are keyed by a canonical rendering of messages,
//!   temperature and max tokens ([`cache::CacheKeyGenerator`])
//! - **Tee on miss**: live events are forwarded untouched while a copy is buffered
//!   and written to the store once the stream completes
//! - **Replay on hit**: stored events are replayed in order with simulated timing
//! - **Pluggable stores**: in-memory, SQLite, or your own [`cache::StreamStore`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_stream_cache::cache::{CacheConfig, CacheService, MemoryStreamStore};
//! use ai_stream_cache::{InvocationParams, Message, StreamingEvent};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ai_stream_cache::Result<()> {
//!     let service = CacheService::start(Arc::new(MemoryStreamStore::new()), CacheConfig::default());
//!     let cache = service.middleware_for(Some("user-42".to_string()));
//!
//!     let params = InvocationParams::new(vec![Message::user("What is a hash table?")]);
//!     let mut stream = cache
//!         .wrap_stream(params, || async {
//!             // Call your provider here.
//!             let events: Vec<ai_stream_cache::Result<StreamingEvent>> =
//!                 vec![Ok(StreamingEvent::text_delta("A hash table is..."))];
//!             Ok(futures::stream::iter(events).boxed())
//!         })
//!         .await?;
//!
//!     while let Some(event) = stream.next().await {
//!         println!("{:?}", event?);
//!     }
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Stream stores, key generation, middleware, maintenance |
//! | [`classifier`] | Creative vs. factual request classification |
//! | [`invoker`] | Model invoker contract and invocation parameters |
//! | [`types`] | Messages and streaming events |

pub mod cache;
pub mod classifier;
pub mod invoker;
pub mod types;

pub use classifier::{is_creative_request, RequestClassifier};
pub use invoker::{InvocationParams, ModelInvoker};
pub use types::{
    events::{StreamingEvent, Usage},
    message::{ContentBlock, Message, MessageContent, MessageRole},
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Stream of model events as produced by an invoker or a cache replay
pub type EventStream = BoxStream<'static, StreamingEvent>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
