use std::sync::Arc;
use std::time::Instant;

use forum_search_client::{SearchClient, SearchError};
use forum_search_types::SearchResult;
use tracing::{debug, error, warn};

use crate::cache::ResultCache;
use crate::keys::SearchFilters;

/// Filters a plain search is cached under: the index and the limit.
pub fn search_filters(index_name: &str, limit: u32) -> SearchFilters {
    let mut filters = SearchFilters::new();
    filters.insert("index".into(), index_name.into());
    filters.insert("limit".into(), limit.into());
    filters
}

/// Search with the result cache in front of the engine.
#[derive(Debug, Clone)]
pub struct CachedSearch {
    client: Arc<SearchClient>,
    cache: Arc<ResultCache>,
}

impl CachedSearch {
    pub fn new(client: Arc<SearchClient>, cache: Arc<ResultCache>) -> Self {
        Self { client, cache }
    }

    pub fn client(&self) -> &Arc<SearchClient> {
        &self.client
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Cached results when present; otherwise query the engine, cache a
    /// non-empty answer and record stats. Failures yield an empty list.
    pub async fn search(&self, raw: &str, limit: u32) -> Vec<SearchResult> {
        let query = self.client.normalizer().normalize(raw);
        if let Err(e) = self.client.validate(&query, limit) {
            warn!(error = %e, "search query rejected");
            return Vec::new();
        }

        let filters = search_filters(self.client.index_name(), limit);
        if let Some(entry) = self.cache.lookup(&query.combined, &filters).await {
            debug!(query = %query.combined, count = entry.count, "served from cache");
            return entry.results;
        }

        let started = Instant::now();
        let results = match self.client.try_search_query(&query, limit).await {
            Ok(results) => results,
            Err(e @ SearchError::Validation(_)) => {
                warn!(error = %e, "search query rejected");
                return Vec::new();
            }
            Err(e) => {
                error!(index = %self.client.index_name(), error = %e, "search failed");
                return Vec::new();
            }
        };
        let elapsed = started.elapsed();

        if !results.is_empty() {
            self.cache
                .store(
                    &query.combined,
                    &filters,
                    &results,
                    Some(self.cache.config().search_ttl),
                )
                .await;
        }
        self.cache
            .update_search_stats(&query.combined, results.len(), elapsed)
            .await;
        results
    }
}
