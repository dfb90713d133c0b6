// crates/core/src/error.rs
use thiserror::Error;

/// Input rejected before anything reaches the wire.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Search query is empty")]
    EmptyQuery,

    #[error("Search query too long: {len} characters (max {max})")]
    QueryTooLong { len: usize, max: usize },

    #[error("Search query contains forbidden sequence {pattern:?}")]
    DangerousPattern { pattern: &'static str },

    #[error("Index name not allowed: {0}")]
    InvalidIndexName(String),

    #[error("Identifier not allowed: {0}")]
    InvalidIdentifier(String),

    #[error("Result limit must be at least 1, got {0}")]
    InvalidLimit(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::QueryTooLong { len: 1200, max: 1000 };
        assert!(err.to_string().contains("1200"));

        let err = ValidationError::DangerousPattern { pattern: "--" };
        assert!(err.to_string().contains("\"--\""));

        let err = ValidationError::InvalidIndexName("users".into());
        assert!(err.to_string().contains("users"));
    }
}
