use std::collections::BTreeMap;

use forum_search_types::IndexSchema;
use serde::Serialize;

/// Health snapshot of the search daemon as seen by one client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub address: String,
    pub index_name: String,
    /// Whether `SHOW STATUS` succeeded on a live connection.
    pub connected: bool,
    pub schema: Option<IndexSchema>,
    /// Daemon counters keyed by name (uptime, queries, ...).
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
