//! Streaming events emitted by a model invocation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token accounting reported with the finish event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Unified streaming event enum.
///
/// Every variant is stored verbatim by the cache and replayed unchanged, so the
/// serialized form is the persistence format as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamingEvent {
    /// Incremental assistant text
    #[serde(rename = "text-delta")]
    TextDelta { text: String },

    /// Incremental reasoning text
    #[serde(rename = "reasoning-delta")]
    ReasoningDelta { text: String },

    /// Tool call arguments streaming
    #[serde(rename = "tool-call-delta")]
    ToolCallDelta {
        tool_call_id: String,
        tool_name: String,
        args_text_delta: String,
    },

    /// Completed tool call
    #[serde(rename = "tool-call")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: String, // JSON text as produced by the provider
    },

    /// Provider response metadata
    #[serde(rename = "response-metadata")]
    ResponseMetadata {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    /// Stream finished
    #[serde(rename = "finish")]
    Finish {
        finish_reason: String,
        usage: Usage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_metadata: Option<serde_json::Value>,
    },

    /// In-band error reported by the provider
    #[serde(rename = "error")]
    Error { error: serde_json::Value },
}

impl StreamingEvent {
    pub fn text_delta(text: impl Into<String>) -> Self {
        StreamingEvent::TextDelta { text: text.into() }
    }

    pub fn finish(finish_reason: impl Into<String>, usage: Usage) -> Self {
        StreamingEvent::Finish {
            finish_reason: finish_reason.into(),
            usage,
            provider_metadata: None,
        }
    }

    pub fn error(error: impl Into<serde_json::Value>) -> Self {
        StreamingEvent::Error {
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamingEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_use_kebab_case_type_tag() {
        let ev = StreamingEvent::text_delta("Hel");
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({"type": "text-delta", "text": "Hel"})
        );

        let finish = StreamingEvent::finish("stop", Usage::new(12, 30));
        assert_eq!(
            serde_json::to_value(&finish).unwrap(),
            json!({
                "type": "finish",
                "finish_reason": "stop",
                "usage": {"prompt_tokens": 12, "completion_tokens": 30}
            })
        );
    }

    #[test]
    fn usage_total_saturates() {
        assert_eq!(Usage::new(3, 4).total_tokens(), 7);
        assert_eq!(Usage::new(u32::MAX, 1).total_tokens(), u32::MAX);
    }
}
