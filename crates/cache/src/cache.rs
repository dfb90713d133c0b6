// crates/cache/src/cache.rs
//! `ResultCache`: versioned search-result cache plus embeddings, model
//! metadata and search statistics.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use forum_search_types::{CacheConfig, SearchResult, VersionSettings};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::backend::CacheBackend;
use crate::keys::{CacheCategory, KeySpace, SearchFilters};
use crate::redis_store::RedisBackend;
use crate::stats::{self, SearchStats};
use crate::version::schema_version;
use crate::{CacheError, CacheResult};

/// One cached result set, exactly as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query: String,
    pub filters: SearchFilters,
    pub results: Vec<SearchResult>,
    pub timestamp: DateTime<Utc>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EmbeddingEntry {
    text: String,
    embeddings: Vec<f32>,
    model_id: String,
    timestamp: DateTime<Utc>,
}

/// Whether the cache can be used at all.
#[derive(Clone)]
enum CacheState {
    /// Turned off by configuration.
    Disabled,
    /// Enabled, but the backend could not be reached at startup.
    Unavailable,
    Ready(Arc<dyn CacheBackend>),
}

impl CacheState {
    fn label(&self) -> &'static str {
        match self {
            CacheState::Disabled => "disabled",
            CacheState::Unavailable => "unavailable",
            CacheState::Ready(_) => "ready",
        }
    }
}

/// Shared cache handle. Construct once and pass it down (`Arc<ResultCache>`).
///
/// Every public operation absorbs backend failures: reads degrade to a miss,
/// writes report `false`. The `try_*` variants surface the error instead.
pub struct ResultCache {
    state: CacheState,
    keys: KeySpace,
    config: CacheConfig,
    version: RwLock<String>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("state", &self.state.label())
            .field("prefix", &self.keys.prefix())
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    /// Connect to Redis when enabled. An unreachable server leaves the cache
    /// `Unavailable` instead of failing.
    pub async fn connect(config: &CacheConfig, version: &VersionSettings) -> Self {
        let state = if !config.enabled {
            info!("result cache disabled by configuration");
            CacheState::Disabled
        } else {
            match RedisBackend::connect(config).await {
                Ok(backend) => CacheState::Ready(Arc::new(backend)),
                Err(e) => {
                    error!(
                        host = %config.host,
                        port = config.port,
                        error = %e,
                        "failed to connect to cache backend, caching off"
                    );
                    CacheState::Unavailable
                }
            }
        };
        Self::from_state(state, config, version)
    }

    /// Use an already connected backend. `config.enabled = false` still
    /// wins: the backend is never called.
    pub fn with_backend(
        config: &CacheConfig,
        version: &VersionSettings,
        backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let state = if config.enabled {
            CacheState::Ready(backend)
        } else {
            CacheState::Disabled
        };
        Self::from_state(state, config, version)
    }

    pub fn disabled() -> Self {
        Self::from_state(
            CacheState::Disabled,
            &CacheConfig::default(),
            &VersionSettings::default(),
        )
    }

    fn from_state(state: CacheState, config: &CacheConfig, version: &VersionSettings) -> Self {
        Self {
            state,
            keys: KeySpace::new(config.prefix.clone()),
            config: config.clone(),
            version: RwLock::new(schema_version(version)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.state, CacheState::Disabled)
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, CacheState::Ready(_))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn schema_version(&self) -> String {
        self.version
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap the version hash; previously cached searches stop matching.
    pub fn set_version_settings(&self, settings: &VersionSettings) {
        let version = schema_version(settings);
        let mut current = self.version.write().unwrap_or_else(PoisonError::into_inner);
        if *current != version {
            info!(version = %version, "search cache version changed");
            *current = version;
        }
    }

    /// Key a `(query, filters)` pair maps to under the current version.
    pub fn search_key(&self, query: &str, filters: &SearchFilters) -> String {
        self.keys.search(query, filters, &self.schema_version())
    }

    fn backend(&self) -> CacheResult<&Arc<dyn CacheBackend>> {
        match &self.state {
            CacheState::Ready(backend) => Ok(backend),
            CacheState::Disabled | CacheState::Unavailable => Err(CacheError::Unavailable),
        }
    }

    // -- search results ---------------------------------------------------

    /// Cached results for the pair, counting a hit or a miss.
    pub async fn lookup(&self, query: &str, filters: &SearchFilters) -> Option<CacheEntry> {
        match self.try_lookup(query, filters).await {
            Ok(entry) => entry,
            Err(CacheError::Unavailable) => None,
            Err(e) => {
                error!(error = %e, "failed to read cached search results");
                None
            }
        }
    }

    /// A corrupt payload is a miss here, not an error.
    pub async fn try_lookup(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> CacheResult<Option<CacheEntry>> {
        let backend = self.backend()?;
        let key = self.search_key(query, filters);

        let Some(raw) = backend.get(&key).await? else {
            self.count(stats::CACHE_MISSES).await;
            return Ok(None);
        };
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => {
                self.count(stats::CACHE_HITS).await;
                debug!(key = %key, count = entry.count, "search cache hit");
                Ok(Some(entry))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "corrupt cached search entry, treating as miss");
                self.count(stats::CACHE_MISSES).await;
                Ok(None)
            }
        }
    }

    /// Store results under the pair. `ttl` defaults to the configured one.
    pub async fn store(
        &self,
        query: &str,
        filters: &SearchFilters,
        results: &[SearchResult],
        ttl: Option<Duration>,
    ) -> bool {
        match self.try_store(query, filters, results, ttl).await {
            Ok(()) => true,
            Err(CacheError::Unavailable) => false,
            Err(e) => {
                error!(error = %e, "failed to cache search results");
                false
            }
        }
    }

    pub async fn try_store(
        &self,
        query: &str,
        filters: &SearchFilters,
        results: &[SearchResult],
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let backend = self.backend()?;
        let entry = CacheEntry {
            query: query.to_string(),
            filters: filters.clone(),
            results: results.to_vec(),
            timestamp: Utc::now(),
            count: results.len(),
        };
        let payload = serde_json::to_string(&entry)?;
        let key = self.search_key(query, filters);
        backend
            .set_ex(&key, &payload, ttl.unwrap_or(self.config.default_ttl))
            .await
    }

    // -- embeddings and model metadata ------------------------------------

    pub async fn cache_embeddings(
        &self,
        text: &str,
        embeddings: &[f32],
        model_id: &str,
        ttl: Option<Duration>,
    ) -> bool {
        let entry = EmbeddingEntry {
            text: text.to_string(),
            embeddings: embeddings.to_vec(),
            model_id: model_id.to_string(),
            timestamp: Utc::now(),
        };
        let key = self.keys.embeddings(model_id, text);
        self.put_json(&key, &entry, ttl.unwrap_or(self.config.embedding_ttl), "embeddings")
            .await
    }

    pub async fn cached_embeddings(&self, text: &str, model_id: &str) -> Option<Vec<f32>> {
        let key = self.keys.embeddings(model_id, text);
        self.get_json::<EmbeddingEntry>(&key, "embeddings")
            .await
            .map(|entry| entry.embeddings)
    }

    pub async fn cache_model_metadata(
        &self,
        model_id: &str,
        metadata: &serde_json::Value,
        ttl: Option<Duration>,
    ) -> bool {
        let key = self.keys.model(model_id);
        self.put_json(&key, metadata, ttl.unwrap_or(self.config.model_ttl), "model metadata")
            .await
    }

    pub async fn cached_model_metadata(&self, model_id: &str) -> Option<serde_json::Value> {
        let key = self.keys.model(model_id);
        self.get_json(&key, "model metadata").await
    }

    async fn put_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        what: &str,
    ) -> bool {
        let result = async {
            let backend = self.backend()?;
            let payload = serde_json::to_string(value)?;
            backend.set_ex(key, &payload, ttl).await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(CacheError::Unavailable) => false,
            Err(e) => {
                error!(what, error = %e, "failed to write cache entry");
                false
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str, what: &str) -> Option<T> {
        let result = async {
            let backend = self.backend()?;
            match backend.get(key).await? {
                Some(raw) => Ok::<_, CacheError>(Some(serde_json::from_str::<T>(&raw)?)),
                None => Ok(None),
            }
        }
        .await;
        match result {
            Ok(value) => value,
            Err(CacheError::Unavailable) => None,
            Err(e) => {
                error!(what, error = %e, "failed to read cache entry");
                None
            }
        }
    }

    // -- statistics -------------------------------------------------------

    /// Record one executed search as a single atomic batch.
    pub async fn update_search_stats(
        &self,
        query: &str,
        result_count: usize,
        response_time: Duration,
    ) -> bool {
        let result = async {
            let backend = self.backend()?;
            let ops = stats::record_ops(
                &self.keys,
                query,
                result_count,
                response_time,
                Utc::now().date_naive(),
            );
            backend.atomic(&ops).await
        }
        .await;
        match result {
            Ok(_) => true,
            Err(CacheError::Unavailable) => false,
            Err(e) => {
                warn!(error = %e, "failed to update search stats");
                false
            }
        }
    }

    /// `None` when the cache is off or the read failed.
    pub async fn search_stats(&self) -> Option<SearchStats> {
        let result = async {
            let backend = self.backend()?;
            let replies = backend.atomic(&stats::read_ops(&self.keys)).await?;
            stats::parse_stats(&replies)
        }
        .await;
        match result {
            Ok(stats) => Some(stats),
            Err(CacheError::Unavailable) => None,
            Err(e) => {
                error!(error = %e, "failed to read search stats");
                None
            }
        }
    }

    /// Searches recorded on `date` (UTC); 0 once the bucket expired.
    pub async fn daily_searches(&self, date: NaiveDate) -> u64 {
        let result = async {
            let backend = self.backend()?;
            backend.get(&self.keys.daily_searches(date)).await
        }
        .await;
        match result {
            Ok(value) => value.and_then(|v| v.parse().ok()).unwrap_or(0),
            Err(CacheError::Unavailable) => 0,
            Err(e) => {
                error!(error = %e, %date, "failed to read daily search count");
                0
            }
        }
    }

    /// Hit/miss counters never fail the lookup they belong to.
    async fn count(&self, counter: &str) {
        if let Ok(backend) = self.backend() {
            if let Err(e) = backend.incr(&self.keys.stat(counter)).await {
                debug!(counter, error = %e, "failed to bump cache counter");
            }
        }
    }

    // -- invalidation -----------------------------------------------------

    /// Delete keys matching `pattern` (relative to the prefix). Returns the
    /// number removed.
    pub async fn clear(&self, pattern: &str) -> u64 {
        let result = async {
            let backend = self.backend()?;
            let keys = backend.scan_keys(&self.keys.pattern(pattern)).await?;
            backend.delete(&keys).await
        }
        .await;
        match result {
            Ok(removed) => {
                info!(pattern, removed, "cleared cache keys");
                removed
            }
            Err(CacheError::Unavailable) => 0,
            Err(e) => {
                error!(pattern, error = %e, "failed to clear cache");
                0
            }
        }
    }

    pub async fn clear_category(&self, category: CacheCategory) -> u64 {
        self.clear(&format!("{}*", category.tag())).await
    }

    pub async fn clear_search_cache(&self) -> u64 {
        self.clear_category(CacheCategory::Search).await
    }

    pub async fn clear_embeddings_cache(&self) -> u64 {
        self.clear_category(CacheCategory::Embeddings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use pretty_assertions::assert_eq;

    fn enabled() -> CacheConfig {
        CacheConfig {
            enabled: true,
            ..Default::default()
        }
    }

    fn cache_with(backend: &Arc<MemoryBackend>) -> ResultCache {
        ResultCache::with_backend(&enabled(), &VersionSettings::default(), backend.clone())
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache_with(&backend);
        let filters = SearchFilters::new();
        backend.insert_raw(&cache.search_key("q", &filters), "{not json");

        assert_eq!(cache.lookup("q", &filters).await, None);
        let stats = cache.search_stats().await.unwrap();
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 0);
    }

    #[tokio::test]
    async fn test_default_ttl_applies() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache_with(&backend);
        let filters = SearchFilters::new();
        assert!(cache.store("q", &filters, &[], None).await);

        let ttl = backend.ttl(&cache.search_key("q", &filters)).unwrap();
        assert!(ttl <= Duration::from_secs(3600));
        assert!(ttl > Duration::from_secs(3500));
    }

    #[tokio::test]
    async fn test_embeddings_round_trip() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache_with(&backend);
        assert!(
            cache
                .cache_embeddings("hamulce", &[0.25, -1.0], "bge-m3", None)
                .await
        );
        assert_eq!(
            cache.cached_embeddings("hamulce", "bge-m3").await,
            Some(vec![0.25, -1.0])
        );
        assert_eq!(cache.cached_embeddings("hamulce", "other").await, None);
    }

    #[tokio::test]
    async fn test_model_metadata_round_trip() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache_with(&backend);
        let meta = serde_json::json!({"dims": 1024, "quantized": true});
        assert!(cache.cache_model_metadata("bge-m3", &meta, None).await);
        assert_eq!(cache.cached_model_metadata("bge-m3").await, Some(meta));
    }

    #[tokio::test]
    async fn test_clear_is_scoped_to_category() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache_with(&backend);
        let filters = SearchFilters::new();
        cache.store("a", &filters, &[], None).await;
        cache.store("b", &filters, &[], None).await;
        cache.cache_embeddings("a", &[1.0], "m", None).await;

        assert_eq!(cache.clear_search_cache().await, 2);
        assert_eq!(cache.cached_embeddings("a", "m").await, Some(vec![1.0]));
        assert_eq!(cache.clear_embeddings_cache().await, 1);
        assert_eq!(cache.clear_search_cache().await, 0);
    }

    #[tokio::test]
    async fn test_backend_failure_is_absorbed() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = cache_with(&backend);
        backend.set_offline(true);

        let filters = SearchFilters::new();
        assert!(!cache.store("q", &filters, &[], None).await);
        assert_eq!(cache.lookup("q", &filters).await, None);
        assert!(!cache.update_search_stats("q", 1, Duration::from_millis(5)).await);
        assert_eq!(cache.search_stats().await, None);
        assert_eq!(cache.clear("*").await, 0);
        assert!(matches!(
            cache.try_store("q", &filters, &[], None).await,
            Err(CacheError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_reports_state() {
        let cache = ResultCache::disabled();
        assert!(!cache.is_enabled());
        assert!(!cache.is_available());
        assert!(matches!(
            cache.try_lookup("q", &SearchFilters::new()).await,
            Err(CacheError::Unavailable)
        ));
    }
}
