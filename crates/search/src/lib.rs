//! Forum search client for a full-text engine speaking a SQL-like protocol.
//!
//! # Architecture
//!
//! - **Wire**: [`wire::Connector`] / [`wire::WireConnection`] abstract the
//!   protocol; [`mysql::MySqlConnector`] is the production implementation.
//! - **Schema**: on the first connection [`probe::probe_schema`] discovers the
//!   index fields (DESCRIBE, then a sample row, then a minimal default).
//! - **Read path**: `SearchClient::search` -> `QueryNormalizer` ->
//!   `QueryBuilder` (schema-aware, bound parameters) -> execute -> map rows.
//! - **Failure policy**: one transparent reconnect-and-retry on a broken
//!   session; every other failure degrades to an empty result list.

pub mod client;
pub mod mock;
pub mod mysql;
pub mod probe;
pub mod types;
pub mod wire;

use std::time::Duration;

use forum_search_core::ValidationError;

pub use client::SearchClient;
pub use mysql::MySqlConnector;
pub use probe::{probe_schema, ProbeOutcome, ProbeTier};
pub use types::EngineStatus;
pub use wire::{Connector, RowSet, WireConnection, WireValue};

/// Errors that can occur during search operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid search request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Search engine unreachable: {0}")]
    Connection(String),

    #[error("Statement failed: {0}")]
    Statement(String),

    #[error("Search engine did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Unexpected row data: {0}")]
    Decode(String),
}

impl SearchError {
    /// True when the session is unusable and a fresh connection may succeed.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, SearchError::Connection(_))
    }
}
