//! # market-core: Pure Query Construction for the Market Backend
//!
//! This crate is the **bottom layer** of the market backend. It turns
//! structured descriptions of single-table operations into parameterized SQL,
//! and holds the domain types the other crates share. Zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Market Backend Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/market-api (axum)                          │   │
//! │  │    /status   /items   /user   /user/deposit   /user/buy        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 market-db (DbClient, migrations)                │   │
//! │  │    create / find_many / increment / transaction(level, unit)    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ market-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   query   │  │ statement │  │   value   │  │   items   │  │   │
//! │  │   │  Filters  │  │  insert   │  │ SqlValue  │  │ aggregate │  │   │
//! │  │   │  OrderBy  │  │  bulk_*   │  │  Record   │  │ sort/page │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`query`] - Filter/sort/page description → `SELECT` plan
//! - [`statement`] - CRUD, bulk and transaction-control statements
//! - [`value`] - `SqlValue`, `Record`, `FromRecord`
//! - [`types`] - Domain rows (`User`, `Transaction`) and item types
//! - [`items`] - Item aggregation, sorting and paging
//! - [`validation`] - Request input checks
//! - [`error`] - Error types
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: same input = same `QueryPlan`, always
//! 2. **Values never in SQL text**: everything is a `$n` placeholder
//! 3. **Identifiers stripped, not escaped**: only `[A-Za-z0-9_]` survives
//! 4. **Explicit Errors**: malformed input is a `QueryError`, never a panic
//!
//! ## Example Usage
//!
//! ```rust
//! use market_core::{statement, Record, SqlValue};
//!
//! let plan = statement::insert("users", &Record::new().with("id", 1).with("name", "John Doe"))
//!     .unwrap();
//!
//! assert_eq!(plan.sql, "INSERT INTO users (id, name) VALUES ($1, $2) RETURNING *");
//! assert_eq!(plan.args, vec![SqlValue::Int(1), SqlValue::Text("John Doe".into())]);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod items;
pub mod query;
pub mod statement;
pub mod types;
pub mod validation;
pub mod value;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{QueryError, QueryResult, RecordError, ValidationError};
pub use query::{
    build_select, CompareOp, Filter, Filters, FindManyParams, OrderBy, Page, QueryPlan,
    SortDirection,
};
pub use statement::IsolationLevel;
pub use types::*;
pub use value::{FromRecord, FromSqlValue, Record, SqlValue};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Decimal places of the `DECIMAL(20, 8)` money columns.
pub const AMOUNT_SCALE: u32 = 8;

/// Integer digits of the `DECIMAL(20, 8)` money columns.
pub const AMOUNT_INTEGER_DIGITS: u32 = 12;
