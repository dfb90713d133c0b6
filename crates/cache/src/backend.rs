//! The key-value operations the cache needs from its store.

use std::time::Duration;

use async_trait::async_trait;

use crate::CacheError;

/// One command inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOp {
    Get(String),
    Incr(String),
    ZIncrBy {
        key: String,
        member: String,
        by: f64,
    },
    LPush {
        key: String,
        value: String,
    },
    /// Keep only `start..=stop` (inclusive, Redis index semantics).
    LTrim {
        key: String,
        start: isize,
        stop: isize,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    /// Members with scores, highest score first.
    ZRevRangeWithScores {
        key: String,
        start: isize,
        stop: isize,
    },
    LRange {
        key: String,
        start: isize,
        stop: isize,
    },
}

/// Reply to one [`CacheOp`], positionally matched to the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheReply {
    Nil,
    Ok,
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
    Scored(Vec<(String, f64)>),
}

impl CacheReply {
    /// Integer view of a reply; `Nil` reads as zero, like a missing counter.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CacheReply::Nil => Some(0),
            CacheReply::Int(v) => Some(*v),
            CacheReply::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A key-value store reachable over the network.
///
/// Implementations must be safe to share between tasks. `atomic` runs the
/// whole batch as one transaction: readers never observe half of it.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn ping(&self) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Number of keys actually removed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// All keys matching a glob `pattern` (`*`, `?`), enumerated
    /// incrementally on the server.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    async fn atomic(&self, ops: &[CacheOp]) -> Result<Vec<CacheReply>, CacheError>;
}
