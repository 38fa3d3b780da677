//! # Error Types
//!
//! Error types for market-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  market-core errors (this file)                                        │
//! │  ├── QueryError       - A statement could not be built                 │
//! │  ├── RecordError      - A row could not be read as a typed record      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  market-db errors (separate crate)                                     │
//! │  └── DbError          - Driver / transaction failures                  │
//! │                                                                         │
//! │  market-api errors (in app)                                            │
//! │  └── ApiError         - What HTTP clients see                          │
//! │                                                                         │
//! │  Flow: QueryError → DbError → ApiError → {"error": "..."}              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these errors ever carries a bound value: values are caller data
//! and never end up in error text.

use thiserror::Error;

// =============================================================================
// Query Error
// =============================================================================

/// A statement could not be compiled.
///
/// All of these are detected before any SQL reaches the database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A table or column name contained no `[A-Za-z0-9_]` characters.
    ///
    /// ## When This Occurs
    /// ```text
    /// sanitize_identifier("users")    → "users"      ✓
    /// sanitize_identifier("us;ers--") → "users"      ✓
    /// sanitize_identifier("';--")     → ""           ✗ EmptyIdentifier
    /// ```
    #[error("identifier '{raw}' is empty after sanitization")]
    EmptyIdentifier { raw: String },

    /// `update` was called without any field to set.
    #[error("update on '{table}' has no fields to set")]
    EmptyUpdate { table: String },

    /// A bulk statement had a record with nothing to write.
    #[error("bulk statement on '{table}' has no columns to write")]
    NoColumns { table: String },

    /// A record in a bulk statement does not share the first record's columns.
    #[error("record {index} does not match the column set of the first record")]
    ColumnMismatch { index: usize },

    /// A record in a bulk update is missing the key column.
    #[error("record {index} is missing key column '{key}'")]
    MissingKey { index: usize, key: String },

    /// Comparison operator outside the supported set.
    #[error("unknown comparison operator '{0}' (expected eq, neq, gt, gte, lt or lte)")]
    UnknownOperator(String),

    /// Sort direction other than ASC/DESC.
    #[error("unknown sort direction '{0}' (expected asc or desc)")]
    UnknownDirection(String),

    /// A JSON filter spec had an unsupported shape.
    #[error("invalid filter for '{column}': {reason}")]
    InvalidFilter { column: String, reason: String },
}

// =============================================================================
// Record Error
// =============================================================================

/// A [`Record`](crate::Record) could not be read as a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("column '{column}' is missing")]
    Missing { column: String },

    #[error("column '{column}' holds {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("column '{column}' holds an unexpected value: {reason}")]
    InvalidValue { column: String, reason: String },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when request input doesn't meet requirements.
/// Used for early validation before anything touches the database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Value has too many decimal places for the column.
    #[error("{field} must have at most {max} decimal places")]
    TooPrecise { field: String, max: u32 },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Convenience type alias for statement building.
pub type QueryResult<T> = Result<T, QueryError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_messages() {
        let err = QueryError::EmptyIdentifier {
            raw: "';--".to_string(),
        };
        assert_eq!(err.to_string(), "identifier '';--' is empty after sanitization");

        let err = QueryError::UnknownOperator("like".to_string());
        assert!(err.to_string().contains("'like'"));
    }

    #[test]
    fn test_record_error_messages() {
        let err = RecordError::TypeMismatch {
            column: "balance".to_string(),
            expected: "decimal",
            found: "text",
        };
        assert_eq!(err.to_string(), "column 'balance' holds text, expected decimal");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "userId".to_string(),
        };
        assert_eq!(err.to_string(), "userId is required");

        let err = ValidationError::MustBePositive {
            field: "value".to_string(),
        };
        assert_eq!(err.to_string(), "value must be positive");
    }
}
