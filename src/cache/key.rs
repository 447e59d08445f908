//! Cache key generation.

use crate::invoker::InvocationParams;
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How the canonical request rendering becomes a store key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyFormat {
    /// The canonical JSON string itself
    #[default]
    Canonical,
    /// Hex SHA-256 of the canonical JSON string
    Sha256,
}

impl std::str::FromStr for KeyFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "canonical" => Ok(KeyFormat::Canonical),
            "sha256" => Ok(KeyFormat::Sha256),
            other => Err(format!("unknown key format '{}'", other)),
        }
    }
}

/// Fingerprint of a request, as used against the stream store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub key: String,
    /// Creative keys carry a uniqueness suffix and never match an earlier entry
    pub creative: bool,
}

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            creative: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Builds store keys from invocation parameters.
///
/// The canonical form is the JSON object `{messages, temperature, maxTokens}`
/// (plus `salt` when set). `serde_json::Map` keeps keys sorted, so the string is
/// independent of field insertion order at every nesting level.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    format: KeyFormat,
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: KeyFormat) -> Self {
        self.format = format;
        self
    }

    /// Salt every key, partitioning the key space (e.g. per owner).
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// Canonical JSON rendering of the cache-relevant request fields.
    pub fn canonical(&self, params: &InvocationParams) -> Result<String> {
        let mut parts = serde_json::Map::new();
        parts.insert("messages".into(), serde_json::to_value(&params.prompt)?);
        parts.insert(
            "temperature".into(),
            serde_json::to_value(params.temperature)?,
        );
        parts.insert("maxTokens".into(), serde_json::to_value(params.max_tokens)?);
        if let Some(ref s) = self.salt {
            parts.insert("salt".into(), serde_json::Value::String(s.clone()));
        }
        Ok(serde_json::to_string(&serde_json::Value::Object(parts))?)
    }

    /// Key for a request. Creative requests get a suffix that makes the key
    /// unique per call.
    pub fn generate(&self, params: &InvocationParams, creative: bool) -> Result<CacheKey> {
        let canonical = self.canonical(params)?;
        let base = match self.format {
            KeyFormat::Canonical => canonical,
            KeyFormat::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(canonical.as_bytes());
                hasher
                    .finalize()
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect()
            }
        };
        if !creative {
            return Ok(CacheKey::new(base));
        }
        let key = format!(
            "{}-{}-{}",
            base,
            chrono::Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );
        Ok(CacheKey {
            key,
            creative: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::Message;
    use serde_json::json;

    fn params() -> InvocationParams {
        InvocationParams::new(vec![
            Message::system("be brief"),
            Message::user("what is a b-tree"),
        ])
        .temperature(0.2)
        .max_tokens(256)
    }

    #[test]
    fn identical_requests_share_a_key() {
        let gen = CacheKeyGenerator::new();
        let a = gen.generate(&params(), false).unwrap();
        let b = gen.generate(&params(), false).unwrap();
        assert_eq!(a, b);
        assert!(!a.creative);
    }

    #[test]
    fn key_ignores_field_order_of_source_json() {
        let gen = CacheKeyGenerator::new();
        let a: InvocationParams = serde_json::from_value(json!({
            "prompt": [{"role": "user", "content": "hi"}],
            "temperature": 0.5,
            "max_tokens": 10
        }))
        .unwrap();
        let b: InvocationParams = serde_json::from_value(json!({
            "max_tokens": 10,
            "temperature": 0.5,
            "prompt": [{"content": "hi", "role": "user"}]
        }))
        .unwrap();
        assert_eq!(
            gen.generate(&a, false).unwrap(),
            gen.generate(&b, false).unwrap()
        );
    }

    #[test]
    fn generation_parameters_change_the_key() {
        let gen = CacheKeyGenerator::new();
        let base = gen.generate(&params(), false).unwrap();
        let warmer = gen.generate(&params().temperature(0.9), false).unwrap();
        let longer = gen.generate(&params().max_tokens(512), false).unwrap();
        let unset = gen
            .generate(
                &InvocationParams::new(params().prompt).temperature(0.2),
                false,
            )
            .unwrap();
        assert_ne!(base, warmer);
        assert_ne!(base, longer);
        assert_ne!(base, unset);
    }

    #[test]
    fn canonical_form_is_sorted_json() {
        let gen = CacheKeyGenerator::new();
        let p = InvocationParams::new(vec![Message::user("hi")]);
        assert_eq!(
            gen.canonical(&p).unwrap(),
            r#"{"maxTokens":null,"messages":[{"content":"hi","role":"user"}],"temperature":null}"#
        );
    }

    #[test]
    fn creative_keys_never_collide() {
        let gen = CacheKeyGenerator::new();
        let a = gen.generate(&params(), true).unwrap();
        let b = gen.generate(&params(), true).unwrap();
        assert!(a.creative && b.creative);
        assert_ne!(a, b);
        let plain = gen.generate(&params(), false).unwrap();
        assert!(a.as_str().starts_with(plain.as_str()));
        assert_ne!(a.as_str(), plain.as_str());
    }

    #[test]
    fn sha256_format_is_hex_digest() {
        let gen = CacheKeyGenerator::new().with_format(KeyFormat::Sha256);
        let key = gen.generate(&params(), false).unwrap();
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, gen.generate(&params(), false).unwrap());
    }

    #[test]
    fn salt_partitions_keys() {
        let alice = CacheKeyGenerator::new().with_salt("alice");
        let bob = CacheKeyGenerator::new().with_salt("bob");
        assert_ne!(
            alice.generate(&params(), false).unwrap(),
            bob.generate(&params(), false).unwrap()
        );
    }

    #[test]
    fn key_format_parses() {
        assert_eq!("SHA256".parse::<KeyFormat>().unwrap(), KeyFormat::Sha256);
        assert_eq!(
            "canonical".parse::<KeyFormat>().unwrap(),
            KeyFormat::Canonical
        );
        assert!("md5".parse::<KeyFormat>().is_err());
    }
}
