//! Model invoker contract.
//!
//! The cache does not talk to providers itself. Whatever performs the real
//! model call implements [`ModelInvoker`] (or is passed to
//! [`StreamCacheMiddleware::wrap_stream`](crate::cache::StreamCacheMiddleware::wrap_stream)
//! as a closure) and returns a live [`EventStream`].

use crate::types::message::Message;
use crate::{EventStream, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Prompt and generation parameters of a single model call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationParams {
    pub prompt: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl InvocationParams {
    pub fn new(prompt: Vec<Message>) -> Self {
        Self {
            prompt,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }
}

/// Performs the real model call and returns its live event stream.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, params: InvocationParams) -> Result<EventStream>;

    fn name(&self) -> &str {
        "unnamed"
    }
}
