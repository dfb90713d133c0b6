// crates/core/src/builder.rs
//
// Field-aware statement construction for the engine's SQL-like protocol.
// Values travel as bound parameters; identifiers are allow-listed, then
// quoted, because the protocol has no placeholders for identifiers.

use std::sync::OnceLock;

use forum_search_types::{IndexSchema, SearchQuery};
use regex_lite::Regex;
use tracing::{debug, warn};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Allow-lists
// ---------------------------------------------------------------------------

pub const MAX_QUERY_LENGTH: usize = 1000;

/// Index names accepted verbatim. Anything else must start with [`INDEX_PREFIX`].
pub const ALLOWED_INDEXES: &[&str] = &[
    "sphinx_main",
    "sphinx_delta",
    "forum_posts",
    "smf_posts",
    "smf_polish_posts",
    "main",
    "delta",
];

pub const INDEX_PREFIX: &str = "sphinx_";

pub const ALLOWED_FIELDS: &[&str] = &[
    "id",
    "topic_id",
    "post_id",
    "board_id",
    "weight",
    "content",
    "body",
    "message",
    "text",
    "subject",
    "title",
    "topic_title",
    "poster_time",
    "poster_name",
    "board_name",
];

/// Rejected anywhere in the match text, case-insensitively.
pub const DANGEROUS_PATTERNS: &[&str] = &[
    ";", "--", "/*", "*/", "union", "select", "insert", "update", "delete", "drop", "create",
    "alter", "exec",
];

/// Optional identifier columns, projected when the index has them.
const ID_FIELDS: &[&str] = &["topic_id", "post_id", "board_id"];

const WEIGHT_PROJECTION: &str = "WEIGHT() AS `weight`";

fn index_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_.]+$").expect("valid regex"))
}

fn field_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid regex"))
}

pub fn validate_index_name(name: &str) -> Result<(), ValidationError> {
    let allowed = index_name_re().is_match(name)
        && (ALLOWED_INDEXES.contains(&name) || name.starts_with(INDEX_PREFIX));
    if allowed {
        Ok(())
    } else {
        Err(ValidationError::InvalidIndexName(name.to_string()))
    }
}

pub fn validate_field_name(name: &str) -> Result<(), ValidationError> {
    if field_name_re().is_match(name) && ALLOWED_FIELDS.contains(&name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier(name.to_string()))
    }
}

/// Check text destined for the `MATCH(?)` placeholder.
pub fn validate_match_text(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyQuery);
    }

    let len = text.chars().count();
    if len > MAX_QUERY_LENGTH {
        return Err(ValidationError::QueryTooLong {
            len,
            max: MAX_QUERY_LENGTH,
        });
    }

    let lowered = text.to_lowercase();
    if let Some(&pattern) = DANGEROUS_PATTERNS.iter().find(|p| lowered.contains(**p)) {
        warn!(pattern, "rejecting search query with forbidden sequence");
        return Err(ValidationError::DangerousPattern { pattern });
    }

    Ok(())
}

/// Quote an identifier that already passed an allow-list check.
pub fn escape_identifier(identifier: &str) -> String {
    let stripped: String = identifier
        .chars()
        .filter(|c| !matches!(c, '`' | '"' | '\''))
        .collect();
    format!("`{stripped}`")
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// A value sent alongside the statement text, never spliced into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Text(String),
    Int(i64),
}

/// A ready-to-execute statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<BindValue>,
    /// Bare column names projected by `sql`, in order. Empty for statements
    /// whose shape is defined by the engine (DESCRIBE, SHOW, `SELECT *`).
    pub fields: Vec<String>,
}

impl Statement {
    fn fixed(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
            fields: Vec::new(),
        }
    }
}

/// Builds statements against one validated index.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    index_name: String,
    max_limit: u32,
}

impl QueryBuilder {
    pub fn new(index_name: &str) -> Result<Self, ValidationError> {
        validate_index_name(index_name)?;
        Ok(Self {
            index_name: index_name.to_string(),
            max_limit: 1000,
        })
    }

    /// Cap applied to the caller's limit.
    pub fn with_max_limit(mut self, max_limit: u32) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Schema-independent checks, usable before a connection exists.
    pub fn validate(&self, query: &SearchQuery, limit: u32) -> Result<(), ValidationError> {
        validate_match_text(&query.combined)?;
        if limit == 0 {
            return Err(ValidationError::InvalidLimit(limit));
        }
        Ok(())
    }

    /// Full-text search statement, projecting only what `schema` exposes.
    pub fn build(
        &self,
        schema: &IndexSchema,
        query: &SearchQuery,
        limit: u32,
    ) -> Result<Statement, ValidationError> {
        self.validate(query, limit)?;
        let limit = limit.min(self.max_limit);

        let mut candidates: Vec<&str> = ID_FIELDS.to_vec();
        if schema.has_content_field() {
            candidates.extend(schema.content_field());
            candidates.extend(schema.subject_field());
        }

        let mut fields = vec!["id".to_string(), "weight".to_string()];
        let mut projections = vec![escape_identifier("id"), WEIGHT_PROJECTION.to_string()];
        for field in candidates {
            if !schema.has_field(field) {
                continue;
            }
            if validate_field_name(field).is_err() {
                debug!(field, "skipping field outside the allow-list");
                continue;
            }
            projections.push(escape_identifier(field));
            fields.push(field.to_string());
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE MATCH(?) ORDER BY `weight` DESC LIMIT ?",
            projections.join(", "),
            escape_identifier(&self.index_name),
        );

        Ok(Statement {
            sql,
            params: vec![
                BindValue::Text(query.combined.clone()),
                BindValue::Int(i64::from(limit)),
            ],
            fields,
        })
    }

    /// Tier-one schema discovery.
    pub fn describe_statement(&self) -> Statement {
        Statement::fixed(format!("DESCRIBE {}", escape_identifier(&self.index_name)))
    }

    /// Tier-two schema discovery: one row, all columns.
    pub fn sample_statement(&self) -> Statement {
        Statement::fixed(format!(
            "SELECT * FROM {} LIMIT 1",
            escape_identifier(&self.index_name)
        ))
    }

    pub fn status_statement() -> Statement {
        Statement::fixed("SHOW STATUS".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::QueryNormalizer;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn query(text: &str) -> SearchQuery {
        QueryNormalizer::polish().normalize(text)
    }

    fn builder() -> QueryBuilder {
        QueryBuilder::new("forum_posts").unwrap()
    }

    #[test]
    fn test_index_allow_list() {
        assert!(validate_index_name("forum_posts").is_ok());
        assert!(validate_index_name("sphinx_archive_2024").is_ok());
        assert!(validate_index_name("users").is_err());
        assert!(validate_index_name("sphinx_x`; DROP").is_err());
        assert!(validate_index_name("").is_err());
    }

    #[test]
    fn test_field_allow_list() {
        assert!(validate_field_name("topic_id").is_ok());
        assert!(validate_field_name("password").is_err());
        assert!(validate_field_name("WEIGHT() as weight").is_err());
    }

    #[test]
    fn test_escape_identifier_strips_quotes() {
        assert_eq!(escape_identifier("forum_posts"), "`forum_posts`");
        assert_eq!(escape_identifier("a`b'c\"d"), "`abcd`");
    }

    #[test]
    fn test_minimal_schema_statement() {
        let stmt = builder()
            .build(&IndexSchema::minimal(), &query("silnik"), 10)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT `id`, WEIGHT() AS `weight`, `topic_id`, `post_id`, `board_id` \
             FROM `forum_posts` WHERE MATCH(?) ORDER BY `weight` DESC LIMIT ?"
        );
        assert_eq!(
            stmt.params,
            vec![BindValue::Text("silnik".into()), BindValue::Int(10)]
        );
        assert_eq!(stmt.fields, vec!["id", "weight", "topic_id", "post_id", "board_id"]);
    }

    #[test]
    fn test_content_schema_projects_one_alias_each() {
        let schema =
            IndexSchema::from_fields(["id", "topic_id", "body", "message", "title", "subject"]);
        let stmt = builder().build(&schema, &query("silnik"), 5).unwrap();
        assert_eq!(stmt.fields, vec!["id", "weight", "topic_id", "body", "subject"]);
        assert!(!stmt.sql.contains("`message`"));
        assert!(!stmt.sql.contains("`post_id`"));
    }

    #[test]
    fn test_subject_needs_content_in_index() {
        let schema = IndexSchema::from_fields(["id", "post_id", "subject"]);
        let stmt = builder().build(&schema, &query("silnik"), 5).unwrap();
        assert_eq!(stmt.fields, vec!["id", "weight", "post_id"]);
    }

    #[test]
    fn test_unlisted_schema_fields_never_projected() {
        let schema = IndexSchema::from_fields(["id", "post_id", "password", "email", "content"]);
        let stmt = builder().build(&schema, &query("silnik"), 5).unwrap();
        assert!(!stmt.sql.contains("password"));
        assert!(!stmt.sql.contains("email"));
    }

    #[test]
    fn test_match_text_is_bound_not_interpolated() {
        let stmt = builder()
            .build(&IndexSchema::minimal(), &query("o'reilly \"quoted\""), 5)
            .unwrap();
        assert!(!stmt.sql.contains("reilly"));
        assert_eq!(
            stmt.params[0],
            BindValue::Text("o'reilly \"quoted\"".into())
        );
    }

    #[test]
    fn test_injection_attempt_rejected() {
        let err = builder()
            .build(&IndexSchema::minimal(), &query("; DROP TABLE x --"), 10)
            .unwrap_err();
        assert_eq!(err, ValidationError::DangerousPattern { pattern: ";" });
    }

    #[test]
    fn test_keywords_rejected_case_insensitively() {
        for text in ["kot UNION all", "SeLeCt kot", "a /* b", "x */ y", "exec kot"] {
            assert!(
                matches!(
                    validate_match_text(text),
                    Err(ValidationError::DangerousPattern { .. })
                ),
                "{text} passed validation"
            );
        }
    }

    #[test]
    fn test_empty_and_oversized_rejected() {
        assert_eq!(validate_match_text("   "), Err(ValidationError::EmptyQuery));
        let long = "a".repeat(MAX_QUERY_LENGTH + 1);
        assert_eq!(
            validate_match_text(&long),
            Err(ValidationError::QueryTooLong {
                len: MAX_QUERY_LENGTH + 1,
                max: MAX_QUERY_LENGTH
            })
        );
        assert!(validate_match_text(&"a".repeat(MAX_QUERY_LENGTH)).is_ok());
    }

    #[test]
    fn test_limit_validation_and_clamp() {
        let schema = IndexSchema::minimal();
        assert_eq!(
            builder().build(&schema, &query("kot"), 0).unwrap_err(),
            ValidationError::InvalidLimit(0)
        );
        let stmt = builder()
            .with_max_limit(50)
            .build(&schema, &query("kot"), 500)
            .unwrap();
        assert_eq!(stmt.params[1], BindValue::Int(50));
    }

    #[test]
    fn test_discovery_statements() {
        let b = QueryBuilder::new("sphinx_main").unwrap();
        assert_eq!(b.describe_statement().sql, "DESCRIBE `sphinx_main`");
        assert_eq!(b.sample_statement().sql, "SELECT * FROM `sphinx_main` LIMIT 1");
        assert!(b.sample_statement().params.is_empty());
    }

    proptest! {
        #[test]
        fn prop_projection_is_subset_of_schema_and_allow_list(
            fields in proptest::collection::vec("[a-z_]{1,12}", 0..12)
        ) {
            let schema = IndexSchema::from_fields(fields.iter().map(String::as_str));
            let stmt = builder().build(&schema, &query("kot"), 10).unwrap();
            for field in stmt.fields.iter().skip(2) {
                prop_assert!(schema.has_field(field));
                prop_assert!(ALLOWED_FIELDS.contains(&field.as_str()));
            }
        }

        #[test]
        fn prop_dangerous_text_always_rejected(
            prefix in "[a-z ]{0,10}",
            idx in 0..DANGEROUS_PATTERNS.len(),
            upper in any::<bool>(),
            suffix in "[a-z ]{0,10}",
        ) {
            let pattern = DANGEROUS_PATTERNS[idx];
            let pattern = if upper { pattern.to_uppercase() } else { pattern.to_string() };
            let text = format!("{prefix}{pattern}{suffix}");
            let q = SearchQuery {
                raw: text.clone(),
                normalized: text.clone(),
                diacritic_folded: text.clone(),
                combined: text,
            };
            let rejected = matches!(
                builder().build(&IndexSchema::minimal(), &q, 10),
                Err(ValidationError::DangerousPattern { .. })
            );
            prop_assert!(rejected);
        }
    }
}
