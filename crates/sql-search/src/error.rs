//! Error types for the SQL search compiler.
//!
//! Every failure here is a caller-contract violation or the complexity guard;
//! unsatisfiable data conditions are rendered as SQL (`0 = 1`) instead of
//! being reported as errors.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The error type for all compiler operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlSearchError {
    /// The expression tree is nested deeper than the configured limit.
    #[error("search is too complex: expression depth {depth} exceeds the limit of {limit}")]
    SearchTooComplex { depth: usize, limit: usize },

    /// A generator received a field it does not know how to render.
    #[error("{generator} does not support field {field}")]
    UnsupportedField {
        generator: &'static str,
        field: String,
    },

    /// A generator received an operator it does not know how to render.
    #[error("{generator} does not support operator {operator}")]
    UnsupportedOperator {
        generator: &'static str,
        operator: String,
    },

    /// A generator received an expression node kind it does not handle.
    #[error("{generator} cannot render {kind} expressions")]
    UnsupportedExpression {
        generator: &'static str,
        kind: &'static str,
    },

    /// A search parameter reached the resource table generator that does not
    /// live on the resource table.
    #[error("unexpected search parameter on the resource table: {name}")]
    UnexpectedSearchParameter { name: String },

    /// A value does not match the SQL type of the column it is bound to.
    #[error("invalid value for column {column}: expected {expected}, got {actual}")]
    InvalidValue {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("unknown search parameter: {url}")]
    UnknownSearchParameter { url: String },

    #[error("unknown resource type: {name}")]
    UnknownResourceType { name: String },

    #[error("unknown compartment type: {name}")]
    UnknownCompartmentType { name: String },

    #[error("unsupported sort: {message}")]
    UnsupportedSort { message: String },

    #[error("invalid continuation token: {token}")]
    InvalidContinuationToken { token: String },

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl SqlSearchError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        SqlSearchError::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the search should be rejected as too complex.
    pub fn is_too_complex(&self) -> bool {
        matches!(self, SqlSearchError::SearchTooComplex { .. })
    }
}

/// Result type alias for compiler operations.
pub type SqlSearchResult<T> = Result<T, SqlSearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_complex_display() {
        let err = SqlSearchError::SearchTooComplex {
            depth: 101,
            limit: 100,
        };
        assert!(err.is_too_complex());
        assert!(err.to_string().contains("101"));
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_unsupported_field_display() {
        let err = SqlSearchError::UnsupportedField {
            generator: "StringQueryGenerator",
            field: "TokenCode".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "StringQueryGenerator does not support field TokenCode"
        );
        assert!(!err.is_too_complex());
    }
}
