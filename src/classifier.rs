//! Creative vs. factual request classification.
//!
//! Requests whose latest turn asks for fresh output ("write a poem", "tell me a
//! joke") should not be answered from cache, while factual or technical
//! questions are safe to replay. Classification is a keyword scan over the last
//! message, with factual signals taking precedence over creative ones.

use crate::types::message::Message;

/// Keywords that mark a request as factual or technical.
pub const DEFAULT_FACTUAL_KEYWORDS: &[&str] = &[
    "explain",
    "what is",
    "what are",
    "how does",
    "how do",
    "how to",
    "why does",
    "why is",
    "definition",
    "define",
    "calculate",
    "compute",
    "solve",
    "debug",
    "fix",
    "error",
    "code",
    "function",
    "algorithm",
    "api",
    "database",
    "syntax",
    "documentation",
    "install",
    "configure",
    "compare",
    "difference between",
    "list",
    "summarize",
    "translate",
    "convert",
    "fact",
    "when did",
    "who is",
    "where is",
];

/// Keywords that mark a request as creative.
pub const DEFAULT_CREATIVE_KEYWORDS: &[&str] = &[
    "write",
    "story",
    "poem",
    "creative",
    "imagine",
    "generate",
    "brainstorm",
    "invent",
    "compose",
    "fiction",
    "novel",
    "song",
    "lyrics",
    "joke",
    "funny",
    "random",
    "surprise",
    "idea",
    "create",
    "design",
    "roleplay",
    "pretend",
    "fantasy",
    "dream",
];

/// Keyword classifier over the latest message of a conversation.
///
/// Matching is case-insensitive substring search, so "api" also matches inside
/// "rapid". Keywords are lower-cased once at construction.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    factual: Vec<String>,
    creative: Vec<String>,
}

impl RequestClassifier {
    /// Classifier with the built-in keyword lists
    pub fn new() -> Self {
        Self::with_keywords(
            DEFAULT_FACTUAL_KEYWORDS.iter().copied(),
            DEFAULT_CREATIVE_KEYWORDS.iter().copied(),
        )
    }

    /// Classifier with custom keyword lists
    pub fn with_keywords<F, C>(factual: F, creative: C) -> Self
    where
        F: IntoIterator,
        F::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self {
            factual: lower_all(factual),
            creative: lower_all(creative),
        }
    }

    pub fn add_factual_keyword(&mut self, keyword: impl AsRef<str>) {
        self.factual.push(keyword.as_ref().to_lowercase());
    }

    pub fn add_creative_keyword(&mut self, keyword: impl AsRef<str>) {
        self.creative.push(keyword.as_ref().to_lowercase());
    }

    /// Whether the conversation's latest turn asks for creative output.
    ///
    /// An empty conversation carries no signal and is not creative.
    pub fn is_creative(&self, messages: &[Message]) -> bool {
        let Some(last) = messages.last() else {
            return false;
        };
        let text = last.plain_text().to_lowercase();

        if self.factual.iter().any(|k| text.contains(k.as_str())) {
            return false;
        }
        self.creative.iter().any(|k| text.contains(k.as_str()))
    }
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn lower_all<I>(keywords: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|k| k.as_ref().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Classify with the built-in keyword lists.
pub fn is_creative_request(messages: &[Message]) -> bool {
    RequestClassifier::new().is_creative(messages)
}
