// crates/core/src/lib.rs
//! CPU-only building blocks of the forum search client: locale-aware query
//! normalization and injection-safe statement construction. Nothing in this
//! crate performs I/O.

pub mod builder;
pub mod error;
pub mod normalizer;

pub use builder::{
    escape_identifier, validate_field_name, validate_index_name, validate_match_text, BindValue,
    QueryBuilder, Statement, ALLOWED_FIELDS, ALLOWED_INDEXES, DANGEROUS_PATTERNS,
    MAX_QUERY_LENGTH,
};
pub use error::ValidationError;
pub use normalizer::{QueryNormalizer, OR_OPERATOR, POLISH_DIACRITICS, POLISH_STOPWORDS};
