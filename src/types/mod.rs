//! # Types Module
//!
//! Strongly-typed representations of what flows through the cache: the chat
//! messages that make up a request and the streaming events a model emits.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and content |
//! | [`MessageContent`] | Plain string or typed content parts |
//! | [`StreamingEvent`] | One unit of streamed model output |
//! | [`Usage`] | Token counts attached to the finish event |
//!
//! ## Example
//!
//! ```rust
//! use ai_stream_cache::types::{ContentBlock, Message, MessageContent, MessageRole};
//!
//! let system = Message::system("You are a helpful assistant");
//! let user = Message::with_content(
//!     MessageRole::User,
//!     MessageContent::blocks(vec![ContentBlock::text("What is in this image?")]),
//! );
//! assert_eq!(user.plain_text(), "What is in this image?");
//! # let _ = system;
//! ```

pub mod events;
pub mod message;

pub use events::{StreamingEvent, Usage};
pub use message::{ContentBlock, Message, MessageContent, MessageRole};
