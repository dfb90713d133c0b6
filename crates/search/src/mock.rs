//! Scripted in-process connector for tests.
//!
//! Statements are routed by shape: `DESCRIBE`, `SELECT *` (schema sample),
//! `SHOW STATUS`, and everything else is treated as a search. Each route has
//! a default reply; searches can additionally be given one-shot replies that
//! are consumed in order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use forum_search_core::Statement;

use crate::wire::{Connector, RowSet, WireConnection, WireValue};
use crate::SearchError;

type Reply = Result<RowSet, SearchError>;

struct MockState {
    describe: Reply,
    sample: Reply,
    status: Reply,
    search: Reply,
    queued: VecDeque<Reply>,
    connect_failures: usize,
    connects: usize,
    closes: usize,
    latency: Option<Duration>,
    executed: Vec<Statement>,
}

/// Connector whose connections answer from a script. Clones share state.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// DESCRIBE and sampling unsupported, searches return no rows.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                describe: Err(SearchError::Statement("DESCRIBE not supported".into())),
                sample: Err(SearchError::Statement("sample not supported".into())),
                status: Ok(RowSet::new(
                    vec!["Counter".into(), "Value".into()],
                    vec![vec![
                        WireValue::Text("uptime".into()),
                        WireValue::Text("42".into()),
                    ]],
                )),
                search: Ok(RowSet::default()),
                queued: VecDeque::new(),
                connect_failures: 0,
                connects: 0,
                closes: 0,
                latency: None,
                executed: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer DESCRIBE with one `Field` row per name.
    pub fn with_fields(self, fields: &[&str]) -> Self {
        let rows = RowSet::new(
            vec!["Field".into(), "Type".into()],
            fields
                .iter()
                .map(|f| vec![WireValue::Text(f.to_string()), WireValue::Text("field".into())])
                .collect(),
        );
        self.with_describe(Ok(rows))
    }

    pub fn with_describe(self, reply: Reply) -> Self {
        self.lock().describe = reply;
        self
    }

    pub fn with_sample(self, reply: Reply) -> Self {
        self.lock().sample = reply;
        self
    }

    pub fn with_status(self, reply: Reply) -> Self {
        self.lock().status = reply;
        self
    }

    /// Default reply for every search statement.
    pub fn with_search_rows(self, rows: RowSet) -> Self {
        self.lock().search = Ok(rows);
        self
    }

    /// Delay applied to every statement from now on.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// One-shot reply for the next search statement.
    pub fn push_search_reply(&self, reply: Reply) {
        self.lock().queued.push_back(reply);
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_connects(&self, n: usize) {
        self.lock().connect_failures = n;
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.lock().executed.clone()
    }

    pub fn search_count(&self) -> usize {
        self.lock()
            .executed
            .iter()
            .filter(|s| route(s) == Route::Search)
            .count()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn WireConnection>, SearchError> {
        let mut state = self.lock();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(SearchError::Connection("connection refused".into()));
        }
        state.connects += 1;
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn address(&self) -> String {
        "mock:9306".into()
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Describe,
    Sample,
    Status,
    Search,
}

fn route(statement: &Statement) -> Route {
    let sql = statement.sql.trim_start();
    if sql.starts_with("DESCRIBE") {
        Route::Describe
    } else if sql.starts_with("SELECT *") {
        Route::Sample
    } else if sql.starts_with("SHOW STATUS") {
        Route::Status
    } else {
        Route::Search
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl WireConnection for MockConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<RowSet, SearchError> {
        let latency = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.executed.push(statement.clone());
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match route(statement) {
            Route::Describe => state.describe.clone(),
            Route::Sample => state.sample.clone(),
            Route::Status => state.status.clone(),
            Route::Search => match state.queued.pop_front() {
                Some(reply) => reply,
                None => state.search.clone(),
            },
        }
    }

    async fn close(self: Box<Self>) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closes += 1;
    }
}
