//! Cache key namespace: `<prefix><category tag><sha256 of payload>`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Filters that accompany a query into its cache key.
pub type SearchFilters = BTreeMap<String, serde_json::Value>;

/// Data category; each owns one key sub-namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    Search,
    Embeddings,
    Model,
    Stats,
    Suggestions,
    Config,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 6] = [
        CacheCategory::Search,
        CacheCategory::Embeddings,
        CacheCategory::Model,
        CacheCategory::Stats,
        CacheCategory::Suggestions,
        CacheCategory::Config,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            CacheCategory::Search => "search:",
            CacheCategory::Embeddings => "embeddings:",
            CacheCategory::Model => "model:",
            CacheCategory::Stats => "stats:",
            CacheCategory::Suggestions => "suggestions:",
            CacheCategory::Config => "config:",
        }
    }
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

/// Builds every key the cache touches, under one namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn hashed(&self, category: CacheCategory, payload: &str) -> String {
        format!("{}{}{}", self.prefix, category.tag(), sha256_hex(payload))
    }

    /// Key for a search result set. The payload is canonical JSON (object
    /// keys sorted) of the query, its filters and the schema version.
    pub fn search(&self, query: &str, filters: &SearchFilters, version: &str) -> String {
        let payload = serde_json::json!({
            "filters": filters,
            "query": query,
            "version": version,
        });
        self.hashed(CacheCategory::Search, &payload.to_string())
    }

    pub fn embeddings(&self, model_id: &str, text: &str) -> String {
        self.hashed(CacheCategory::Embeddings, &format!("{model_id}:{text}"))
    }

    pub fn model(&self, model_id: &str) -> String {
        self.hashed(CacheCategory::Model, model_id)
    }

    /// Statistics keys are readable names, not hashes.
    pub fn stat(&self, name: &str) -> String {
        format!("{}{}{}", self.prefix, CacheCategory::Stats.tag(), name)
    }

    pub fn daily_searches(&self, date: NaiveDate) -> String {
        self.stat(&format!("daily:{}:searches", date.format("%Y-%m-%d")))
    }

    /// `pattern` anchored under the namespace.
    pub fn pattern(&self, pattern: &str) -> String {
        format!("{}{}", self.prefix, pattern)
    }

    pub fn category_pattern(&self, category: CacheCategory) -> String {
        self.pattern(&format!("{}*", category.tag()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn filters(pairs: &[(&str, serde_json::Value)]) -> SearchFilters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_key_layout() {
        let keys = KeySpace::new("sphinxai:");
        let key = keys.model("bge-m3");
        assert!(key.starts_with("sphinxai:model:"));
        assert_eq!(key.len(), "sphinxai:model:".len() + 64);
        assert_eq!(keys.stat("search_count"), "sphinxai:stats:search_count");
        assert_eq!(
            keys.daily_searches(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()),
            "sphinxai:stats:daily:2024-03-09:searches"
        );
        assert_eq!(
            keys.category_pattern(CacheCategory::Embeddings),
            "sphinxai:embeddings:*"
        );
    }

    #[test]
    fn test_search_key_ignores_filter_insertion_order() {
        let keys = KeySpace::new("p:");
        let a = filters(&[("index", "forum_posts".into()), ("limit", 10.into())]);
        let b = filters(&[("limit", 10.into()), ("index", "forum_posts".into())]);
        assert_eq!(keys.search("q", &a, "v1"), keys.search("q", &b, "v1"));
    }

    #[test]
    fn test_search_key_depends_on_every_part() {
        let keys = KeySpace::new("p:");
        let f = filters(&[("limit", 10.into())]);
        let base = keys.search("q", &f, "v1");
        assert_ne!(base, keys.search("q2", &f, "v1"));
        assert_ne!(base, keys.search("q", &f, "v2"));
        assert_ne!(base, keys.search("q", &filters(&[("limit", 20.into())]), "v1"));
        assert_ne!(base, KeySpace::new("other:").search("q", &f, "v1"));
    }

    #[test]
    fn test_embedding_key_scoped_by_model() {
        let keys = KeySpace::new("p:");
        assert_ne!(keys.embeddings("m1", "tekst"), keys.embeddings("m2", "tekst"));
    }

    #[test]
    fn test_category_tags_are_distinct() {
        let mut tags: Vec<_> = CacheCategory::ALL.iter().map(|c| c.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), CacheCategory::ALL.len());
    }
}
