//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  PostgreSQL error (sqlx::Error / PgDatabaseError)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DriverError ← message + SQLSTATE code + detail + hint                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError::Query { context, sql, source } ← which operation failed      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ApiError (in market-api) ← mapped to an HTTP status                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bound argument values are logged at trace/error level but never copied
//! into an error.

use std::fmt;

use market_core::{QueryError, RecordError};
use sqlx::postgres::PgDatabaseError;
use thiserror::Error;

/// SQLSTATE of a serialization failure under SERIALIZABLE isolation.
pub const SERIALIZATION_FAILURE: &str = "40001";

/// SQLSTATE of a detected deadlock.
pub const DEADLOCK_DETECTED: &str = "40P01";

// =============================================================================
// Driver Error
// =============================================================================

/// A failure reported by the database driver, with the structured fields
/// PostgreSQL attaches to it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DriverError {
    pub message: String,
    /// SQLSTATE, e.g. `23503` for a foreign-key violation.
    pub code: Option<String>,
    pub detail: Option<String>,
    pub hint: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        DriverError {
            message: message.into(),
            ..DriverError::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_serialization_failure(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        )
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DriverError {}

/// Extracts SQLSTATE/detail/hint when the driver error came from PostgreSQL.
impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let mut driver = DriverError::new(db_err.message());
                if let Some(pg) = db_err.try_downcast_ref::<PgDatabaseError>() {
                    driver.code = Some(pg.code().to_string());
                    driver.detail = pg.detail().map(str::to_string);
                    driver.hint = pg.hint().map(str::to_string);
                } else if let Some(code) = db_err.code() {
                    driver.code = Some(code.into_owned());
                }
                driver
            }
            _ => DriverError::new(err.to_string()),
        }
    }
}

// =============================================================================
// Db Error
// =============================================================================

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A statement failed in the database.
    ///
    /// ## When This Occurs
    /// - Constraint violations (foreign key, unique, not null)
    /// - Serialization failures under SERIALIZABLE (`code() == "40001"`)
    /// - Invalid values for a column type
    ///
    /// Displays as `"<context> - <driver message>"`, e.g.
    /// `"Failed to increment record - relation \"users\" does not exist"`.
    #[error("{context} - {source}")]
    Query {
        context: &'static str,
        sql: String,
        #[source]
        source: DriverError,
    },

    /// A transaction unit gave up on purpose (business rule).
    ///
    /// ## When This Occurs
    /// - A purchase would make the balance negative
    #[error("{0}")]
    Aborted(String),

    /// The unit failed and the following ROLLBACK failed too.
    #[error("{cause} (rollback also failed: {rollback})")]
    RollbackFailed {
        cause: Box<DbError>,
        rollback: DriverError,
    },

    /// `transaction` was called from inside a transaction unit.
    #[error("Nested transactions are not supported")]
    NestedTransaction,

    /// A returned row could not be mapped to the requested type.
    #[error("Failed to decode row: {0}")]
    Decode(#[from] RecordError),

    /// The statement could not be built.
    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    /// Could not reach the database.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A migration script failed.
    #[error("Migration {name} ({direction}) failed: {source}")]
    Migration {
        name: String,
        direction: &'static str,
        #[source]
        source: Box<DbError>,
    },
}

impl DbError {
    pub(crate) fn query(context: &'static str, sql: &str, source: DriverError) -> Self {
        DbError::Query {
            context,
            sql: sql.to_string(),
            source,
        }
    }

    /// Driver error behind this error, looking through rollback wrappers.
    pub fn driver(&self) -> Option<&DriverError> {
        match self {
            DbError::Query { source, .. } => Some(source),
            DbError::RollbackFailed { cause, .. } => cause.driver(),
            DbError::Migration { source, .. } => source.driver(),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.driver().and_then(|d| d.code.as_deref())
    }

    pub fn detail(&self) -> Option<&str> {
        self.driver().and_then(|d| d.detail.as_deref())
    }

    pub fn hint(&self) -> Option<&str> {
        self.driver().and_then(|d| d.hint.as_deref())
    }

    /// True when a concurrent transaction won and this one was rolled back.
    pub fn is_serialization_failure(&self) -> bool {
        self.driver()
            .is_some_and(DriverError::is_serialization_failure)
    }
}

/// Maps pool/connection level failures.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::PoolClosed     → DbError::ConnectionFailed
/// Other                       → DbError::ConnectionFailed
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            other => DbError::ConnectionFailed(other.to_string()),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================
