//! # market-db: Transactional Data Client
//!
//! This crate executes market-core statements against PostgreSQL through
//! sqlx, one connection per [`DbClient`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Market Backend Data Flow                         │
//! │                                                                         │
//! │  UsersService::buy(user_id, value)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     market-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │   DbClient    │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  (client.rs)  │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ PgPool        │───►│ create        │    │ 1_users      │  │   │
//! │  │   │ client()      │    │ find_many     │    │ 2_transact.. │  │   │
//! │  │   │               │    │ transaction   │    │ up / down    │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │ DbConnection (connection.rs)  │   │
//! │  └────────────────────────────────┼────────────────────────────────┘   │
//! │                                   ▼                                     │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     PostgreSQL                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`client`] - CRUD, bulk and transaction operations
//! - [`connection`] - The connection seam and row decoding
//! - [`migrations`] - Embedded up/down migrations
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use market_db::{Database, DbConfig};
//! use market_core::User;
//!
//! let db = Database::new(DbConfig::from_env()?).await?;
//!
//! let mut client = db.client().await?;
//! let user: Option<User> = client.find_unique("users", user_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod connection;
pub mod error;
pub mod migrations;
pub mod pool;

#[cfg(test)]
mod fake;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::DbClient;
pub use connection::DbConnection;
pub use error::{DbError, DbResult, DriverError};
pub use pool::{ClientProvider, Database, DbConfig};
