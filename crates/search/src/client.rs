// crates/search/src/client.rs
//! The search client: one wire session, one schema snapshot, one retry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use forum_search_core::{QueryBuilder, QueryNormalizer, Statement};
use forum_search_types::{IndexSchema, SearchEngineConfig, SearchQuery, SearchResult};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::mysql::MySqlConnector;
use crate::probe::probe_schema;
use crate::types::EngineStatus;
use crate::wire::{Connector, RowSet, WireConnection};
use crate::SearchError;

/// Where the wire session currently stands.
///
/// `Connecting` is only observed when an in-flight call was cancelled while
/// it held the connection; the next caller treats it like `Disconnected`.
enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(Box<dyn WireConnection>),
}

impl ConnectionState {
    fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected(_) => "connected",
        }
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug)]
struct Session {
    state: ConnectionState,
    schema: Option<Arc<IndexSchema>>,
}

/// Client for one index on the search daemon.
///
/// Safe to share across tasks (`Arc<SearchClient>`). Calls are serialized
/// on the single wire session, so at most one (re)connect is ever in flight
/// and throughput is one statement at a time per client.
pub struct SearchClient {
    connector: Arc<dyn Connector>,
    builder: QueryBuilder,
    normalizer: QueryNormalizer,
    query_timeout: Duration,
    session: Mutex<Session>,
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("address", &self.connector.address())
            .field("index", &self.builder.index_name())
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl SearchClient {
    /// Build a client over the MySQL-protocol connector. Does not connect.
    ///
    /// Fails only when the configured index name is not allowed.
    pub fn new(config: &SearchEngineConfig) -> Result<Self, SearchError> {
        Self::with_connector(config, Arc::new(MySqlConnector::new(config)))
    }

    pub fn with_connector(
        config: &SearchEngineConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SearchError> {
        let builder = QueryBuilder::new(&config.index_name)?.with_max_limit(config.max_results);
        Ok(Self {
            connector,
            builder,
            normalizer: QueryNormalizer::polish(),
            query_timeout: config.query_timeout,
            session: Mutex::new(Session {
                state: ConnectionState::Disconnected,
                schema: None,
            }),
        })
    }

    /// Build a client and try to connect and probe right away. An unreachable
    /// engine is logged, not returned; the next search retries.
    pub async fn connect(config: &SearchEngineConfig) -> Result<Self, SearchError> {
        let client = Self::new(config)?;
        client.warm_up().await;
        Ok(client)
    }

    /// Connect and probe the schema if not done yet.
    pub async fn warm_up(&self) {
        let mut session = self.session.lock().await;
        if let Err(e) = self.ensure_connected(&mut session).await {
            warn!(
                address = %self.connector.address(),
                error = %e,
                "search engine not reachable yet"
            );
        }
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        &self.normalizer
    }

    pub fn index_name(&self) -> &str {
        self.builder.index_name()
    }

    /// The schema snapshot, once a connection has probed it.
    pub async fn schema(&self) -> Option<Arc<IndexSchema>> {
        self.session.lock().await.schema.clone()
    }

    pub async fn is_connected(&self) -> bool {
        matches!(
            self.session.lock().await.state,
            ConnectionState::Connected(_)
        )
    }

    /// Checks that need no connection: match text and limit.
    pub fn validate(&self, query: &SearchQuery, limit: u32) -> Result<(), SearchError> {
        Ok(self.builder.validate(query, limit)?)
    }

    /// Search the index. Every failure is logged and yields an empty list.
    pub async fn search(&self, raw: &str, limit: u32) -> Vec<SearchResult> {
        let query = self.normalizer.normalize(raw);
        self.search_query(&query, limit).await
    }

    /// [`SearchClient::search`] for an already normalized query.
    pub async fn search_query(&self, query: &SearchQuery, limit: u32) -> Vec<SearchResult> {
        match self.try_search_query(query, limit).await {
            Ok(results) => results,
            Err(SearchError::Validation(e)) => {
                warn!(index = %self.index_name(), error = %e, "search query rejected");
                Vec::new()
            }
            Err(e) => {
                error!(index = %self.index_name(), error = %e, "search failed");
                Vec::new()
            }
        }
    }

    /// Like [`SearchClient::search`], but reports why nothing came back.
    pub async fn try_search(&self, raw: &str, limit: u32) -> Result<Vec<SearchResult>, SearchError> {
        let query = self.normalizer.normalize(raw);
        self.try_search_query(&query, limit).await
    }

    pub async fn try_search_query(
        &self,
        query: &SearchQuery,
        limit: u32,
    ) -> Result<Vec<SearchResult>, SearchError> {
        // Rejected input never reaches the network.
        self.validate(query, limit)?;

        let mut session = self.session.lock().await;
        match self.run_search(&mut session, query, limit).await {
            Err(e) if e.is_connection_error() => {
                info!(
                    address = %self.connector.address(),
                    error = %e,
                    "search engine connection lost, reconnecting"
                );
                self.run_search(&mut session, query, limit).await
            }
            other => other,
        }
    }

    /// Engine counters from `SHOW STATUS`. Never fails; problems land in
    /// `EngineStatus::error`.
    pub async fn status(&self) -> EngineStatus {
        let mut session = self.session.lock().await;
        let fetched = match self.ensure_connected(&mut session).await {
            Ok(_) => {
                self.execute_on(&mut session, &QueryBuilder::status_statement())
                    .await
            }
            Err(e) => Err(e),
        };

        let mut status = EngineStatus {
            address: self.connector.address(),
            index_name: self.index_name().to_string(),
            connected: false,
            schema: session.schema.as_deref().cloned(),
            variables: BTreeMap::new(),
            error: None,
        };
        match fetched {
            Ok(rows) => {
                status.connected = true;
                status.variables = status_variables(&rows);
            }
            Err(e) => {
                warn!(address = %status.address, error = %e, "status query failed");
                status.error = Some(e.to_string());
            }
        }
        status
    }

    /// Close the wire session. The schema snapshot is kept.
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        Self::close_session(&mut session).await;
    }

    /// Close the wire session and forget the schema; the next call
    /// reconnects and probes again.
    pub async fn reset(&self) {
        let mut session = self.session.lock().await;
        Self::close_session(&mut session).await;
        session.schema = None;
        debug!(index = %self.index_name(), "search client reset");
    }

    async fn close_session(session: &mut Session) {
        if let ConnectionState::Connected(conn) =
            std::mem::replace(&mut session.state, ConnectionState::Disconnected)
        {
            conn.close().await;
        }
    }

    async fn run_search(
        &self,
        session: &mut Session,
        query: &SearchQuery,
        limit: u32,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let schema = self.ensure_connected(session).await?;
        let statement = self.builder.build(&schema, query, limit)?;

        let started = Instant::now();
        let rows = self.execute_on(session, &statement).await?;
        let results = map_rows(&rows, &schema);
        debug!(
            index = %self.index_name(),
            query = %query.combined,
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search completed"
        );
        Ok(results)
    }

    /// Leave the session `Connected` with a probed schema, or return why not.
    async fn ensure_connected(&self, session: &mut Session) -> Result<Arc<IndexSchema>, SearchError> {
        let mut conn = match std::mem::replace(&mut session.state, ConnectionState::Connecting) {
            ConnectionState::Connected(conn) => conn,
            previous => {
                debug!(state = previous.label(), "opening search engine connection");
                match self.connector.connect().await {
                    Ok(conn) => {
                        info!(
                            address = %self.connector.address(),
                            index = %self.index_name(),
                            "connected to search engine"
                        );
                        conn
                    }
                    Err(e) => {
                        session.state = ConnectionState::Disconnected;
                        return Err(e);
                    }
                }
            }
        };

        let schema = match &session.schema {
            Some(schema) => Arc::clone(schema),
            None => {
                let outcome = probe_schema(conn.as_mut(), &self.builder, self.query_timeout).await;
                if outcome.connection_lost {
                    session.state = ConnectionState::Disconnected;
                    return Err(SearchError::Connection(
                        "connection lost during schema probe".into(),
                    ));
                }
                let schema = Arc::new(outcome.schema);
                session.schema = Some(Arc::clone(&schema));
                schema
            }
        };

        session.state = ConnectionState::Connected(conn);
        Ok(schema)
    }

    /// Run one statement on the held connection under the query timeout.
    ///
    /// A broken or timed-out connection is dropped and the session marked
    /// `Disconnected`; a failed statement keeps it.
    async fn execute_on(
        &self,
        session: &mut Session,
        statement: &Statement,
    ) -> Result<RowSet, SearchError> {
        let ConnectionState::Connected(mut conn) =
            std::mem::replace(&mut session.state, ConnectionState::Connecting)
        else {
            session.state = ConnectionState::Disconnected;
            return Err(SearchError::Connection("not connected".into()));
        };

        match tokio::time::timeout(self.query_timeout, conn.execute(statement)).await {
            Ok(Ok(rows)) => {
                session.state = ConnectionState::Connected(conn);
                Ok(rows)
            }
            Ok(Err(e)) if e.is_connection_error() => {
                session.state = ConnectionState::Disconnected;
                Err(e)
            }
            Ok(Err(e)) => {
                session.state = ConnectionState::Connected(conn);
                Err(e)
            }
            Err(_) => {
                warn!(
                    index = %self.index_name(),
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "statement timed out, dropping connection"
                );
                session.state = ConnectionState::Disconnected;
                Err(SearchError::Timeout(self.query_timeout))
            }
        }
    }
}

/// Rows to results. Content availability comes from the schema snapshot,
/// never from the individual row.
fn map_rows(rows: &RowSet, schema: &IndexSchema) -> Vec<SearchResult> {
    let content_in_index = schema.has_content_field();
    let content_field = schema.content_field().filter(|_| content_in_index);
    let subject_field = schema.subject_field().filter(|_| content_in_index);

    rows.rows
        .iter()
        .map(|row| {
            let id = |name: &str| rows.value(row, name).and_then(|v| v.as_u64());
            let text = |name: Option<&str>| {
                name.and_then(|n| rows.value(row, n))
                    .and_then(|v| v.as_text())
            };
            SearchResult {
                id: id("id"),
                topic_id: id("topic_id"),
                post_id: id("post_id"),
                board_id: id("board_id"),
                weight: rows
                    .value(row, "weight")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0),
                content_in_index,
                needs_content_fetch: !content_in_index,
                content: text(content_field),
                subject: text(subject_field),
            }
        })
        .collect()
}

/// `SHOW STATUS` rows as name -> value. searchd names the key column
/// `Counter`, MySQL-style servers `Variable_name`.
fn status_variables(rows: &RowSet) -> BTreeMap<String, String> {
    let key = rows
        .column_index("Counter")
        .or_else(|| rows.column_index("Variable_name"))
        .unwrap_or(0);
    let value = rows.column_index("Value").unwrap_or(1);
    rows.rows
        .iter()
        .filter_map(|row| {
            let name = row.get(key)?.as_text()?;
            let value = row.get(value).and_then(|v| v.as_text()).unwrap_or_default();
            Some((name, value))
        })
        .collect()
}
