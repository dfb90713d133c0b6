//! Result cache for forum search.
//!
//! Search results are stored under keys that embed a hash of the settings
//! that shape them (see [`version::schema_version`]), so a configuration
//! change invalidates old entries without any active purge. The same store
//! keeps embeddings, model metadata and search statistics.
//!
//! The store is reached through [`CacheBackend`]: [`RedisBackend`] in
//! production, [`MemoryBackend`] in tests.

pub mod backend;
pub mod cache;
pub mod cached_search;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod stats;
pub mod version;

use std::time::Duration;

use thiserror::Error;

pub use backend::{CacheBackend, CacheOp, CacheReply};
pub use cache::{CacheEntry, ResultCache};
pub use cached_search::{search_filters, CachedSearch};
pub use keys::{CacheCategory, KeySpace, SearchFilters};
pub use memory::MemoryBackend;
pub use redis_store::RedisBackend;
pub use stats::{PopularQuery, SearchStats};
pub use version::schema_version;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Corrupt cache payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Cache key {key} holds a value of the wrong type")]
    WrongType { key: String },

    #[error("Cache is disabled or unavailable")]
    Unavailable,
}

pub type CacheResult<T> = Result<T, CacheError>;
