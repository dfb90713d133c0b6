//! Transport seam between the client and the engine's SQL-like protocol.
//!
//! The client only ever sees [`RowSet`]s; the MySQL-protocol implementation
//! lives in [`crate::mysql`] and a scripted one in [`crate::mock`].

use async_trait::async_trait;
use forum_search_core::Statement;

use crate::SearchError;

/// A single cell as decoded from the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl WireValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            WireValue::Int(v) => u64::try_from(*v).ok(),
            WireValue::UInt(v) => Some(*v),
            WireValue::Text(s) => s.trim().parse().ok(),
            WireValue::Null | WireValue::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::Int(v) => Some(*v as f64),
            WireValue::UInt(v) => Some(*v as f64),
            WireValue::Float(v) => Some(*v),
            WireValue::Text(s) => s.trim().parse().ok(),
            WireValue::Null => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            WireValue::Text(s) => Some(s.clone()),
            WireValue::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl std::fmt::Display for WireValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireValue::Null => f.write_str("NULL"),
            WireValue::Int(v) => write!(f, "{v}"),
            WireValue::UInt(v) => write!(f, "{v}"),
            WireValue::Float(v) => write!(f, "{v}"),
            WireValue::Text(s) => f.write_str(s),
        }
    }
}

/// Column names plus row values, positionally aligned.
///
/// `columns` is empty when the statement returned no rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<WireValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<WireValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name`, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Cell of `row` under column `name`.
    pub fn value<'a>(&self, row: &'a [WireValue], name: &str) -> Option<&'a WireValue> {
        self.column_index(name).and_then(|i| row.get(i))
    }
}

/// An open protocol session.
#[async_trait]
pub trait WireConnection: Send {
    async fn execute(&mut self, statement: &Statement) -> Result<RowSet, SearchError>;

    /// Graceful shutdown. Dropping without calling this is also allowed and
    /// simply abandons the socket.
    async fn close(self: Box<Self>);
}

/// Factory for [`WireConnection`]s.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn WireConnection>, SearchError>;

    /// Human-readable address for logs (e.g. `127.0.0.1:9306`).
    fn address(&self) -> String;
}
