//! Shared data model for the forum search client and its result cache.
//!
//! Everything here is plain data: the index schema snapshot produced by the
//! schema probe, the normalized query, the rows mapped into `SearchResult`, and
//! the typed configuration consumed by the client and the cache.

pub mod config;
pub mod query;
pub mod result;
pub mod schema;

pub use config::{CacheConfig, ConfigError, SearchEngineConfig, Settings, VersionSettings};
pub use query::SearchQuery;
pub use result::SearchResult;
pub use schema::{
    IndexSchema, CONTENT_FIELD_ALIASES, MINIMAL_FIELDS, SUBJECT_FIELD_ALIASES,
};
