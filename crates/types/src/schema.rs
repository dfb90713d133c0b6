use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Column names that carry renderable post content, in projection priority order.
pub const CONTENT_FIELD_ALIASES: [&str; 4] = ["content", "body", "message", "text"];

/// Column names that carry the post subject, in projection priority order.
pub const SUBJECT_FIELD_ALIASES: [&str; 3] = ["subject", "title", "topic_title"];

/// Field set assumed when the index cannot be described or sampled.
pub const MINIMAL_FIELDS: [&str; 4] = ["id", "topic_id", "post_id", "board_id"];

/// Snapshot of the fields one search index exposes.
///
/// Built once per connection lifetime by the schema probe and never mutated;
/// a re-probe replaces it wholesale. The two flags are always derived from
/// `available_fields`, so the only way to build one is through
/// [`IndexSchema::from_fields`] or [`IndexSchema::minimal`]. Deserializing
/// reads only the field list and recomputes the flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "SchemaFields")]
pub struct IndexSchema {
    available_fields: BTreeSet<String>,
    has_content_field: bool,
    has_subject_field: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaFields {
    available_fields: Vec<String>,
}

impl From<SchemaFields> for IndexSchema {
    fn from(raw: SchemaFields) -> Self {
        Self::from_fields(raw.available_fields)
    }
}

impl IndexSchema {
    /// Build a schema from the raw column names reported by the engine.
    /// Names are lowercased; blank names are ignored.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let available_fields: BTreeSet<String> = fields
            .into_iter()
            .map(|f| f.as_ref().trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();

        let has_content_field = CONTENT_FIELD_ALIASES
            .iter()
            .any(|alias| available_fields.contains(*alias));
        let has_subject_field = SUBJECT_FIELD_ALIASES
            .iter()
            .any(|alias| available_fields.contains(*alias));

        Self {
            available_fields,
            has_content_field,
            has_subject_field,
        }
    }

    /// The degraded schema: identifiers only, no content, no subject.
    pub fn minimal() -> Self {
        Self::from_fields(MINIMAL_FIELDS)
    }

    pub fn available_fields(&self) -> &BTreeSet<String> {
        &self.available_fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.available_fields.contains(name)
    }

    pub fn has_content_field(&self) -> bool {
        self.has_content_field
    }

    pub fn has_subject_field(&self) -> bool {
        self.has_subject_field
    }

    /// First content alias present in the index, if any.
    pub fn content_field(&self) -> Option<&'static str> {
        CONTENT_FIELD_ALIASES
            .iter()
            .copied()
            .find(|alias| self.has_field(alias))
    }

    /// First subject alias present in the index, if any.
    pub fn subject_field(&self) -> Option<&'static str> {
        SUBJECT_FIELD_ALIASES
            .iter()
            .copied()
            .find(|alias| self.has_field(alias))
    }
}
