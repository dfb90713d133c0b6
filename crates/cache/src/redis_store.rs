//! Redis implementation of [`CacheBackend`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use forum_search_types::CacheConfig;
use redis::aio::ConnectionManager;
use redis::{from_redis_value, AsyncCommands, RedisError, RedisResult, Value};
use tracing::{debug, info};

use crate::backend::{CacheBackend, CacheOp, CacheReply};
use crate::CacheError;

/// Keys requested per `SCAN` step.
const SCAN_COUNT: usize = 500;

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// Redis behind a reconnecting [`ConnectionManager`]; cheap to clone.
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Open a managed connection and verify it with `PING`.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(connection_url(config))?;
        let manager = tokio::time::timeout(config.op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(config.op_timeout))??;

        let backend = Self {
            manager,
            op_timeout: config.op_timeout,
        };
        backend.ping().await?;
        info!(
            host = %config.host,
            port = config.port,
            database = config.database,
            "connected to cache backend"
        );
        Ok(backend)
    }

    async fn bounded<T>(&self, op: impl Future<Output = RedisResult<T>>) -> Result<T, CacheError> {
        tokio::time::timeout(self.op_timeout, op)
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout))?
            .map_err(CacheError::from)
    }
}

/// `redis://[:password@]host:port/db`, password percent-encoded.
pub(crate) fn connection_url(config: &CacheConfig) -> String {
    match config.password.as_deref() {
        Some(password) => format!(
            "redis://:{}@{}:{}/{}",
            urlencoding::encode(password),
            config.host,
            config.port,
            config.database
        ),
        None => format!("redis://{}:{}/{}", config.host, config.port, config.database),
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _pong: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        self.bounded(async move { conn.get(key).await }).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let seconds = ttl.as_secs().max(1);
        self.bounded(async move { conn.set_ex(key, value, seconds).await })
            .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.manager.clone();
        self.bounded(async move { conn.del(keys).await }).await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.manager.clone();
        let keys = self
            .bounded(async move {
                let mut keys = Vec::new();
                let mut cursor: u64 = 0;
                loop {
                    let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT)
                        .query_async(&mut conn)
                        .await?;
                    keys.extend(batch);
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
                Ok::<_, RedisError>(keys)
            })
            .await?;
        debug!(pattern, matched = keys.len(), "scanned cache keys");
        Ok(keys)
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.manager.clone();
        self.bounded(async move { conn.incr(key, 1).await }).await
    }

    async fn atomic(&self, ops: &[CacheOp]) -> Result<Vec<CacheReply>, CacheError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                CacheOp::Get(key) => pipe.get(key),
                CacheOp::Incr(key) => pipe.incr(key, 1),
                CacheOp::ZIncrBy { key, member, by } => pipe.zincr(key, member, *by),
                CacheOp::LPush { key, value } => pipe.lpush(key, value),
                CacheOp::LTrim { key, start, stop } => pipe.ltrim(key, *start, *stop),
                CacheOp::Expire { key, ttl } => {
                    pipe.expire(key, i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
                }
                CacheOp::ZRevRangeWithScores { key, start, stop } => {
                    pipe.zrevrange_withscores(key, *start, *stop)
                }
                CacheOp::LRange { key, start, stop } => pipe.lrange(key, *start, *stop),
            };
        }

        let mut conn = self.manager.clone();
        let values: Vec<Value> = self
            .bounded(async move { pipe.query_async(&mut conn).await })
            .await?;
        if values.len() != ops.len() {
            return Err(CacheError::Backend(format!(
                "transaction returned {} replies for {} commands",
                values.len(),
                ops.len()
            )));
        }

        ops.iter()
            .zip(&values)
            .map(|(op, value)| convert_reply(op, value).map_err(CacheError::from))
            .collect()
    }
}

fn convert_reply(op: &CacheOp, value: &Value) -> RedisResult<CacheReply> {
    Ok(match op {
        CacheOp::Get(_) => match from_redis_value::<Option<String>>(value)? {
            Some(s) => CacheReply::Str(s),
            None => CacheReply::Nil,
        },
        CacheOp::Incr(_) | CacheOp::LPush { .. } | CacheOp::Expire { .. } => {
            CacheReply::Int(from_redis_value(value)?)
        }
        CacheOp::ZIncrBy { .. } => CacheReply::Float(from_redis_value(value)?),
        CacheOp::LTrim { .. } => {
            from_redis_value::<()>(value)?;
            CacheReply::Ok
        }
        CacheOp::ZRevRangeWithScores { .. } => CacheReply::Scored(from_redis_value(value)?),
        CacheOp::LRange { .. } => CacheReply::List(from_redis_value(value)?),
    })
}
