//! Cache configuration.
//!
//! All knobs carry defaults so `CacheConfig::default()` is a working
//! setup; deployments override via a TOML file or `CACHET_*` environment
//! variables through [`CacheConfig::load`].

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::codec::Codec;
use crate::error::CacheError;

const DEFAULT_CONFIG_BASENAME: &str = "cachet";
const ENV_PREFIX: &str = "CACHET";

const DEFAULT_MAX_CACHE_SIZE_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_CACHE_DURATION_SECS: u64 = 3600;
const DEFAULT_STORE_ENTRY_LIMIT: usize = 10_000;

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget for all stored payloads combined.
    pub max_cache_size_bytes: u64,
    /// Entry lifetime when the request carries no duration override.
    pub default_cache_duration_secs: u64,
    /// Entry-count capacity of the default in-memory store.
    pub store_entry_limit: usize,
    /// Compress payloads before storing.
    pub compression_enabled: bool,
    /// Codec used when compression is enabled.
    pub compression_codec: Codec,
    /// Silence eviction/store log lines.
    pub suppress_logs: bool,
    /// Query parameter that opts a request into the cache.
    pub use_cache_param: String,
    /// Query parameter that requests eviction.
    pub evict_param: String,
    /// Query parameter carrying a comma-separated tag list to evict.
    pub evict_tags_param: String,
    /// Query parameter adding seconds to the entry lifetime.
    pub cache_seconds_param: String,
    /// Query parameter adding minutes to the entry lifetime.
    pub cache_minutes_param: String,
    /// Query parameter adding hours to the entry lifetime.
    pub cache_hours_param: String,
    /// Response header carrying the comma-separated tag list to attach.
    pub tags_header: String,
    /// Response headers replayed on a cache hit.
    pub allowed_headers: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size_bytes: DEFAULT_MAX_CACHE_SIZE_BYTES,
            default_cache_duration_secs: DEFAULT_CACHE_DURATION_SECS,
            store_entry_limit: DEFAULT_STORE_ENTRY_LIMIT,
            compression_enabled: true,
            compression_codec: Codec::Gzip,
            suppress_logs: false,
            use_cache_param: "useCache".to_string(),
            evict_param: "evict".to_string(),
            evict_tags_param: "evictTags".to_string(),
            cache_seconds_param: "cacheSeconds".to_string(),
            cache_minutes_param: "cacheMinutes".to_string(),
            cache_hours_param: "cacheHours".to_string(),
            tags_header: "X-Cache-Tags".to_string(),
            allowed_headers: vec![
                "Content-Type".to_string(),
                "Content-Language".to_string(),
                "ETag".to_string(),
                "Last-Modified".to_string(),
            ],
        }
    }
}

impl CacheConfig {
    /// Load configuration with layered precedence: file, then environment.
    ///
    /// When `path` is `None` a `cachet.toml` next to the process is used
    /// if present; a missing file is not an error, the defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, CacheError> {
        let mut builder = Config::builder();
        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false)),
        };
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| CacheError::configuration(err.to_string()))
    }

    /// Entry lifetime applied when the request carries no override.
    pub fn default_cache_duration(&self) -> Duration {
        Duration::from_secs(self.default_cache_duration_secs)
    }

    /// Returns the store entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn store_entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.store_entry_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Query parameters that steer the cache rather than the handler.
    /// These are stripped before key generation.
    pub fn control_params(&self) -> [&str; 6] {
        [
            self.use_cache_param.as_str(),
            self.evict_param.as_str(),
            self.evict_tags_param.as_str(),
            self.cache_seconds_param.as_str(),
            self.cache_minutes_param.as_str(),
            self.cache_hours_param.as_str(),
        ]
    }

    /// Whether a response header may be replayed on a hit.
    pub fn is_header_allowed(&self, name: &str) -> bool {
        self.allowed_headers
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(name))
    }
}
