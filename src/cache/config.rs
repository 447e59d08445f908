//! Cache configuration.

use super::key::KeyFormat;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_REPLAY_INITIAL_DELAY: Duration = Duration::from_millis(20);
pub const DEFAULT_REPLAY_CHUNK_DELAY: Duration = Duration::from_millis(3);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_millis(3_600_000);

/// Pacing of a cache-hit replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayTiming {
    /// Delay before the first replayed event
    pub initial_delay: Duration,
    /// Delay between consecutive replayed events
    pub chunk_delay: Duration,
}

impl ReplayTiming {
    /// No artificial delays at all
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            chunk_delay: Duration::ZERO,
        }
    }
}

impl Default for ReplayTiming {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_REPLAY_INITIAL_DELAY,
            chunk_delay: DEFAULT_REPLAY_CHUNK_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Lifetime of a stored response
    pub ttl: Duration,
    pub replay: ReplayTiming,
    /// Period of the background expiry sweep
    pub cleanup_interval: Duration,
    pub key_format: KeyFormat,
    /// Salt keys with the owner id so entries are only served back to the
    /// user who produced them. Off by default: identical requests from
    /// different users share entries.
    pub partition_by_owner: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_TTL,
            replay: ReplayTiming::default(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            key_format: KeyFormat::default(),
            partition_by_owner: false,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_replay(mut self, replay: ReplayTiming) -> Self {
        self.replay = replay;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_key_format(mut self, format: KeyFormat) -> Self {
        self.key_format = format;
        self
    }

    pub fn with_partition_by_owner(mut self, partition: bool) -> Self {
        self.partition_by_owner = partition;
        self
    }

    /// Defaults overridden by `AI_CACHE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env(|k| std::env::var(k).ok())
    }

    /// Apply `AI_CACHE_*` overrides from an arbitrary lookup.
    ///
    /// Recognized keys: `AI_CACHE_ENABLED`, `AI_CACHE_TTL_SECS`,
    /// `AI_CACHE_REPLAY_INITIAL_DELAY_MS`, `AI_CACHE_REPLAY_CHUNK_DELAY_MS`,
    /// `AI_CACHE_CLEANUP_INTERVAL_SECS`, `AI_CACHE_KEY_FORMAT`,
    /// `AI_CACHE_PARTITION_BY_OWNER`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AI_CACHE_ENABLED") {
            self.enabled = parse_bool("AI_CACHE_ENABLED", &v)?;
        }
        if let Some(v) = lookup("AI_CACHE_TTL_SECS") {
            self.ttl = Duration::from_secs(parse_u64("AI_CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = lookup("AI_CACHE_REPLAY_INITIAL_DELAY_MS") {
            self.replay.initial_delay =
                Duration::from_millis(parse_u64("AI_CACHE_REPLAY_INITIAL_DELAY_MS", &v)?);
        }
        if let Some(v) = lookup("AI_CACHE_REPLAY_CHUNK_DELAY_MS") {
            self.replay.chunk_delay =
                Duration::from_millis(parse_u64("AI_CACHE_REPLAY_CHUNK_DELAY_MS", &v)?);
        }
        if let Some(v) = lookup("AI_CACHE_CLEANUP_INTERVAL_SECS") {
            self.cleanup_interval =
                Duration::from_secs(parse_u64("AI_CACHE_CLEANUP_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = lookup("AI_CACHE_KEY_FORMAT") {
            self.key_format = v.parse().map_err(|e: String| invalid("AI_CACHE_KEY_FORMAT", e))?;
        }
        if let Some(v) = lookup("AI_CACHE_PARTITION_BY_OWNER") {
            self.partition_by_owner = parse_bool("AI_CACHE_PARTITION_BY_OWNER", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Parse a YAML document; absent fields keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: CacheConfigFile = serde_yaml::from_str(yaml)?;
        let config = file.into_config();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cleanup_interval.is_zero() {
            return Err(Error::configuration_with_context(
                "cleanup interval must be greater than zero",
                ErrorContext::new()
                    .with_field_path("cleanup_interval_secs")
                    .with_source("cache_config"),
            ));
        }
        Ok(())
    }
}

/// On-disk shape of [`CacheConfig`]
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
struct CacheConfigFile {
    enabled: Option<bool>,
    ttl_secs: Option<u64>,
    replay_initial_delay_ms: Option<u64>,
    replay_chunk_delay_ms: Option<u64>,
    cleanup_interval_secs: Option<u64>,
    key_format: Option<KeyFormat>,
    partition_by_owner: Option<bool>,
}

impl CacheConfigFile {
    fn into_config(self) -> CacheConfig {
        let d = CacheConfig::default();
        CacheConfig {
            enabled: self.enabled.unwrap_or(d.enabled),
            ttl: self.ttl_secs.map(Duration::from_secs).unwrap_or(d.ttl),
            replay: ReplayTiming {
                initial_delay: self
                    .replay_initial_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(d.replay.initial_delay),
                chunk_delay: self
                    .replay_chunk_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(d.replay.chunk_delay),
            },
            cleanup_interval: self
                .cleanup_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(d.cleanup_interval),
            key_format: self.key_format.unwrap_or(d.key_format),
            partition_by_owner: self.partition_by_owner.unwrap_or(d.partition_by_owner),
        }
    }
}

fn invalid(var: &str, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        format!("invalid value for {}", var),
        ErrorContext::new()
            .with_field_path(var)
            .with_details(details)
            .with_source("cache_config"),
    )
}

fn parse_u64(var: &str, v: &str) -> Result<u64> {
    v.trim()
        .parse::<u64>()
        .map_err(|e| invalid(var, format!("'{}': {}", v, e)))
}

fn parse_bool(var: &str, v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, format!("'{}' is not a boolean", v))),
    }
}
