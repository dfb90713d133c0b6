// crates/types/src/config.rs
//! Typed configuration for the search client and the result cache.
//!
//! Every struct carries its documented defaults through `Default`. The
//! `from_lookup` constructors read named environment-style keys through a
//! caller-supplied function so tests never touch the process environment;
//! `from_env` is the thin wrapper over `std::env::var`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Connection settings for the search engine's SQL-like listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEngineConfig {
    pub host: String,
    pub port: u16,
    pub index_name: String,
    pub connect_timeout: Duration,
    /// Upper bound on one statement round trip. On expiry the connection
    /// is dropped and the next call reconnects.
    pub query_timeout: Duration,
    /// Ceiling applied to the caller's `limit`.
    pub max_results: u32,
}

impl Default for SearchEngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9306,
            index_name: "forum_posts".into(),
            connect_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(10),
            max_results: 1000,
        }
    }
}

impl SearchEngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(host) = non_empty(&lookup, "SPHINX_AI_SEARCH_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_u16(&lookup, "SPHINX_AI_SEARCH_PORT")? {
            config.port = port;
        }
        if let Some(index) = non_empty(&lookup, "SPHINX_AI_SEARCH_INDEX") {
            config.index_name = index;
        }
        if let Some(secs) = parse_secs(&lookup, "SPHINX_AI_SEARCH_CONNECT_TIMEOUT")? {
            config.connect_timeout = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "SPHINX_AI_SEARCH_QUERY_TIMEOUT")? {
            config.query_timeout = secs;
        }
        if let Some(max) = parse_u32(&lookup, "SPHINX_AI_SEARCH_MAX_RESULTS")? {
            if max == 0 {
                return Err(ConfigError::Invalid {
                    key: "SPHINX_AI_SEARCH_MAX_RESULTS",
                    value: max.to_string(),
                    reason: "must be at least 1",
                });
            }
            config.max_results = max;
        }
        Ok(config)
    }
}

/// Settings for the key-value cache backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: u32,
    /// Namespace prepended to every key.
    pub prefix: String,
    /// TTL for entries stored without an explicit one.
    pub default_ttl: Duration,
    pub search_ttl: Duration,
    pub embedding_ttl: Duration,
    pub model_ttl: Duration,
    /// Per-operation deadline for backend round trips.
    pub op_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".into(),
            port: 6379,
            password: None,
            database: 0,
            prefix: "sphinxai:".into(),
            default_ttl: Duration::from_secs(3600),
            search_ttl: Duration::from_secs(1800),
            embedding_ttl: Duration::from_secs(24 * 3600),
            model_ttl: Duration::from_secs(24 * 3600),
            op_timeout: Duration::from_secs(2),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(enabled) = parse_bool(&lookup, "SPHINX_AI_CACHE_ENABLED")? {
            config.enabled = enabled;
        }
        if let Some(host) = non_empty(&lookup, "SPHINX_AI_CACHE_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_u16(&lookup, "SPHINX_AI_CACHE_PORT")? {
            config.port = port;
        }
        config.password = non_empty(&lookup, "SPHINX_AI_CACHE_PASSWORD");
        if let Some(db) = parse_u32(&lookup, "SPHINX_AI_CACHE_DATABASE")? {
            config.database = db;
        }
        if let Some(prefix) = lookup("SPHINX_AI_CACHE_PREFIX") {
            config.prefix = prefix;
        }
        if let Some(ttl) = parse_secs(&lookup, "SPHINX_AI_CACHE_TTL")? {
            config.default_ttl = ttl;
        }
        if let Some(ttl) = parse_secs(&lookup, "SPHINX_AI_CACHE_SEARCH_TTL")? {
            config.search_ttl = ttl;
        }
        if let Some(ttl) = parse_secs(&lookup, "SPHINX_AI_CACHE_EMBEDDING_TTL")? {
            config.embedding_ttl = ttl;
        }
        if let Some(ttl) = parse_secs(&lookup, "SPHINX_AI_CACHE_MODEL_TTL")? {
            config.model_ttl = ttl;
        }
        Ok(config)
    }
}

/// Settings that change the shape of search results. Their hash is folded
/// into every search cache key, so changing any of them orphans old entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSettings {
    pub model_path: String,
    pub model_type: String,
    pub max_results: String,
}

impl Default for VersionSettings {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            model_type: String::new(),
            max_results: "50".into(),
        }
    }
}

impl VersionSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            model_path: lookup("SPHINX_AI_MODEL_PATH").unwrap_or(defaults.model_path),
            model_type: lookup("SPHINX_AI_MODEL_TYPE").unwrap_or(defaults.model_type),
            max_results: lookup("SPHINX_AI_MAX_RESULTS").unwrap_or(defaults.max_results),
        }
    }
}

/// Everything the search core consumes, in one place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub search: SearchEngineConfig,
    pub cache: CacheConfig,
    pub version: VersionSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            search: SearchEngineConfig::from_lookup(&lookup)?,
            cache: CacheConfig::from_lookup(&lookup)?,
            version: VersionSettings::from_lookup(&lookup),
        })
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_u16(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u16>, ConfigError> {
    match non_empty(lookup, key) {
        None => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|_| ConfigError::Invalid {
            key,
            value: v,
            reason: "expected a port number",
        }),
    }
}

fn parse_u32(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u32>, ConfigError> {
    match non_empty(lookup, key) {
        None => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|_| ConfigError::Invalid {
            key,
            value: v,
            reason: "expected a non-negative integer",
        }),
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    match non_empty(lookup, key) {
        None => Ok(None),
        Some(v) => match v.parse::<u64>() {
            Ok(0) | Err(_) => Err(ConfigError::Invalid {
                key,
                value: v,
                reason: "expected a positive number of seconds",
            }),
            Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        },
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match non_empty(lookup, key) {
        None => Ok(None),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Invalid {
                key,
                value: v,
                reason: "expected a boolean",
            }),
        },
    }
}
