//! MySQL-protocol connector for SphinxQL / Manticore listeners.

use std::time::Duration;

use async_trait::async_trait;
use forum_search_core::{BindValue, Statement};
use forum_search_types::SearchEngineConfig;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::wire::{Connector, RowSet, WireConnection, WireValue};
use crate::SearchError;

/// Opens single MySQL-protocol connections to the search daemon.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
    address: String,
}

impl MySqlConnector {
    pub fn new(config: &SearchEngineConfig) -> Self {
        // searchd has no sql_mode or time zone session variables; skip the
        // session setup sqlx would otherwise send after the handshake.
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .charset("utf8mb4")
            .pipes_as_concat(false)
            .no_engine_substitution(false)
            .timezone(None)
            .set_names(false);

        Self {
            options,
            connect_timeout: config.connect_timeout,
            address: format!("{}:{}", config.host, config.port),
        }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn WireConnection>, SearchError> {
        let conn = tokio::time::timeout(self.connect_timeout, self.options.connect())
            .await
            .map_err(|_| SearchError::Timeout(self.connect_timeout))?
            .map_err(map_sqlx_error)?;
        Ok(Box::new(MySqlWire { conn }))
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}

struct MySqlWire {
    conn: MySqlConnection,
}

#[async_trait]
impl WireConnection for MySqlWire {
    async fn execute(&mut self, statement: &Statement) -> Result<RowSet, SearchError> {
        // The SphinxQL listener has no COM_STMT_PREPARE; parameters are
        // rendered client-side and the statement goes out as plain text.
        let sql = render_statement(statement)?;
        let rows: Vec<MySqlRow> = self
            .conn
            .fetch_all(sqlx::raw_sql(&sql))
            .await
            .map_err(map_sqlx_error)?;
        to_row_set(&rows)
    }

    async fn close(self: Box<Self>) {
        let MySqlWire { conn } = *self;
        if let Err(e) = conn.close().await {
            debug!(error = %e, "error closing search engine connection");
        }
    }
}

/// Substitute each `?` placeholder with its escaped parameter. Placeholders
/// inside quoted identifiers or literals are left alone.
fn render_statement(statement: &Statement) -> Result<String, SearchError> {
    let mut params = statement.params.iter();
    let mut out = String::with_capacity(statement.sql.len() + 64);
    let mut quote: Option<char> = None;

    for c in statement.sql.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (Some(_), c) => out.push(c),
            (None, '`' | '\'' | '"') => {
                quote = Some(c);
                out.push(c);
            }
            (None, '?') => match params.next() {
                Some(BindValue::Text(text)) => push_string_literal(&mut out, text),
                Some(BindValue::Int(value)) => out.push_str(&value.to_string()),
                None => {
                    return Err(SearchError::Statement(
                        "more placeholders than parameters".into(),
                    ))
                }
            },
            (None, c) => out.push(c),
        }
    }

    if params.next().is_some() {
        return Err(SearchError::Statement(
            "more parameters than placeholders".into(),
        ));
    }
    Ok(out)
}

/// Quoted MySQL string literal with the escapes `mysql_real_escape_string` applies.
fn push_string_literal(out: &mut String, text: &str) {
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn to_row_set(rows: &[MySqlRow]) -> Result<RowSet, SearchError> {
    let Some(first) = rows.first() else {
        return Ok(RowSet::default());
    };
    let columns = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = Vec::with_capacity(row.len());
        for idx in 0..row.len() {
            cells.push(decode_cell(row, idx)?);
        }
        values.push(cells);
    }
    Ok(RowSet::new(columns, values))
}

fn decode_cell(row: &MySqlRow, idx: usize) -> Result<WireValue, SearchError> {
    let type_name = {
        let raw = row.try_get_raw(idx).map_err(map_sqlx_error)?;
        if raw.is_null() {
            return Ok(WireValue::Null);
        }
        raw.type_info().name().to_ascii_uppercase()
    };

    let decoded = match type_name.as_str() {
        name if name.ends_with("UNSIGNED") => {
            row.try_get_unchecked::<u64, _>(idx).map(WireValue::UInt)
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get_unchecked::<i64, _>(idx).map(WireValue::Int)
        }
        "FLOAT" => row
            .try_get_unchecked::<f32, _>(idx)
            .map(|v| WireValue::Float(f64::from(v))),
        "DOUBLE" => row.try_get_unchecked::<f64, _>(idx).map(WireValue::Float),
        _ => row.try_get_unchecked::<String, _>(idx).map(WireValue::Text),
    };
    decoded.map_err(map_sqlx_error)
}

/// Split sqlx failures into "the session is gone" and "this statement failed".
fn map_sqlx_error(err: sqlx::Error) -> SearchError {
    match err {
        sqlx::Error::Database(db) => SearchError::Statement(db.message().to_string()),
        e @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. }) => SearchError::Decode(e.to_string()),
        e => SearchError::Connection(e.to_string()),
    }
}
