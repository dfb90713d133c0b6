//! Runtime discovery of the fields an index exposes.
//!
//! Three tiers, each tried only when the previous one produced nothing:
//! `DESCRIBE`, a one-row `SELECT *` sample, then the fixed minimal field set.
//! The probe never fails; the worst case is a degraded schema.

use std::time::Duration;

use forum_search_core::{QueryBuilder, Statement};
use forum_search_types::IndexSchema;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::wire::{RowSet, WireConnection};
use crate::SearchError;

/// Which discovery tier produced the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeTier {
    Describe,
    Sample,
    Minimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub schema: IndexSchema,
    pub tier: ProbeTier,
    /// A tier failed because the session itself broke (or timed out). The
    /// schema is still usable, but the connection must not be reused.
    pub connection_lost: bool,
}

/// Probe `conn` for the fields of the builder's index.
pub async fn probe_schema(
    conn: &mut dyn WireConnection,
    builder: &QueryBuilder,
    timeout: Duration,
) -> ProbeOutcome {
    let index = builder.index_name();
    let mut connection_lost = false;

    let (fields, tier) = 'tiers: {
        match run(conn, &builder.describe_statement(), timeout).await {
            Ok(rows) => match described_fields(&rows) {
                Some(fields) => break 'tiers (fields, ProbeTier::Describe),
                None => debug!(index, "DESCRIBE returned no field column"),
            },
            Err(e) => {
                connection_lost |= is_fatal(&e);
                debug!(index, error = %e, "DESCRIBE unavailable");
            }
        }

        if !connection_lost {
            match run(conn, &builder.sample_statement(), timeout).await {
                Ok(rows) if !rows.is_empty() && !rows.columns.is_empty() => {
                    break 'tiers (rows.columns, ProbeTier::Sample);
                }
                Ok(_) => warn!(index, "index is empty, assuming minimal field set"),
                Err(e) => {
                    connection_lost |= is_fatal(&e);
                    debug!(index, error = %e, "sample query failed");
                }
            }
        }

        (Vec::new(), ProbeTier::Minimal)
    };

    let schema = match tier {
        ProbeTier::Minimal => IndexSchema::minimal(),
        _ => IndexSchema::from_fields(&fields),
    };

    match tier {
        ProbeTier::Minimal => warn!(
            index,
            fields = ?schema.available_fields(),
            "could not detect index fields, using minimal set"
        ),
        _ => info!(
            index,
            tier = ?tier,
            fields = ?schema.available_fields(),
            content_in_index = schema.has_content_field(),
            subject_in_index = schema.has_subject_field(),
            "detected index fields"
        ),
    }
    if !schema.has_content_field() {
        info!(index, "content not stored in index, results will need a content fetch");
    }

    ProbeOutcome {
        schema,
        tier,
        connection_lost,
    }
}

async fn run(
    conn: &mut dyn WireConnection,
    statement: &Statement,
    timeout: Duration,
) -> Result<RowSet, SearchError> {
    tokio::time::timeout(timeout, conn.execute(statement))
        .await
        .map_err(|_| SearchError::Timeout(timeout))?
}

fn is_fatal(err: &SearchError) -> bool {
    err.is_connection_error() || matches!(err, SearchError::Timeout(_))
}

/// Field names from a `DESCRIBE` result (`Field` column, or the first one).
fn described_fields(rows: &RowSet) -> Option<Vec<String>> {
    if rows.is_empty() {
        return None;
    }
    let idx = rows.column_index("Field").unwrap_or(0);
    let fields: Vec<String> = rows
        .rows
        .iter()
        .filter_map(|row| row.get(idx).and_then(|v| v.as_text()))
        .collect();
    (!fields.is_empty()).then_some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;
    use crate::wire::{Connector, WireValue};
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn builder() -> QueryBuilder {
        QueryBuilder::new("forum_posts").unwrap()
    }

    async fn probe(connector: &MockConnector) -> ProbeOutcome {
        let mut conn = connector.connect().await.unwrap();
        probe_schema(conn.as_mut(), &builder(), TIMEOUT).await
    }

    #[tokio::test]
    async fn test_describe_tier() {
        let connector =
            MockConnector::new().with_fields(&["id", "topic_id", "post_id", "content", "subject"]);
        let outcome = probe(&connector).await;
        assert_eq!(outcome.tier, ProbeTier::Describe);
        assert!(outcome.schema.has_content_field());
        assert!(outcome.schema.has_subject_field());
        assert!(!outcome.connection_lost);
    }

    #[tokio::test]
    async fn test_sample_tier_when_describe_unsupported() {
        let sample = RowSet::new(
            vec!["id".into(), "topic_id".into(), "body".into()],
            vec![vec![
                WireValue::UInt(1),
                WireValue::UInt(2),
                WireValue::Text("hello".into()),
            ]],
        );
        let connector = MockConnector::new().with_sample(Ok(sample));
        let outcome = probe(&connector).await;
        assert_eq!(outcome.tier, ProbeTier::Sample);
        assert_eq!(outcome.schema, IndexSchema::from_fields(["id", "topic_id", "body"]));
    }

    #[tokio::test]
    async fn test_empty_index_falls_to_minimal() {
        let connector = MockConnector::new().with_sample(Ok(RowSet::default()));
        let outcome = probe(&connector).await;
        assert_eq!(outcome.tier, ProbeTier::Minimal);
        assert_eq!(outcome.schema, IndexSchema::minimal());
        assert!(!outcome.connection_lost);
    }

    #[tokio::test]
    async fn test_both_tiers_failing_gives_minimal() {
        let connector = MockConnector::new()
            .with_describe(Err(SearchError::Statement("unknown command".into())))
            .with_sample(Err(SearchError::Statement("no such index".into())));
        let outcome = probe(&connector).await;
        assert_eq!(outcome.tier, ProbeTier::Minimal);
        assert_eq!(outcome.schema, IndexSchema::minimal());
        assert!(!outcome.schema.has_content_field());
        assert!(!outcome.schema.has_subject_field());
    }

    #[tokio::test]
    async fn test_connection_loss_is_reported_and_skips_sample() {
        let connector = MockConnector::new()
            .with_describe(Err(SearchError::Connection("broken pipe".into())));
        let outcome = probe(&connector).await;
        assert!(outcome.connection_lost);
        assert_eq!(outcome.tier, ProbeTier::Minimal);
        assert_eq!(connector.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_probe_is_idempotent() {
        let connector = MockConnector::new().with_fields(&["id", "post_id", "message"]);
        let first = probe(&connector).await;
        let second = probe(&connector).await;
        assert_eq!(first, second);
    }
}
