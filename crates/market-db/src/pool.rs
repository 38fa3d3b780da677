//! # Database Pool Management
//!
//! Connection pool creation and configuration for PostgreSQL.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  API Startup                                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::new(host, port, user, password, db) ← Configure pool        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool (+ migrations if enabled)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │              PgPool                      │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │ db.client() per request                                         │
//! │       ▼                                                                 │
//! │  GET  /user          ──► DbClient(Conn1)                               │
//! │  POST /user/buy      ──► DbClient(Conn2)  SERIALIZABLE transaction     │
//! │  POST /user/deposit  ──► DbClient(Conn3)                               │
//! │  (dropping a client returns its connection to the pool)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, Postgres};
use tracing::{debug, info};

use crate::client::DbClient;
use crate::connection::DbConnection;
use crate::error::{DbError, DbResult};
use crate::migrations::{Direction, MigrationRunner};

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust
/// use market_db::DbConfig;
///
/// let config = DbConfig::new("localhost", 5432, "postgres", "secret", "market")
///     .max_connections(20)
///     .min_connections(1);
/// assert_eq!(config.max_connections, 20);
/// ```
#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,

    /// Maximum number of connections in the pool.
    /// Default: 10
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// How long `client()` waits for a free connection.
    /// Default: 30 seconds
    pub acquire_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to apply pending migrations on connect.
    /// Default: false (the `migrate` binary owns the schema)
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        DbConfig {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            database: database.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: false,
        }
    }

    /// Reads `PSQL_HOST`, `PSQL_PORT`, `PSQL_USERNAME`, `PSQL_PASSWORD` and
    /// `PSQL_DATABASE`, with local-development defaults.
    pub fn from_env() -> DbResult<Self> {
        let var = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.into());

        let port = var("PSQL_PORT", "5432").parse::<u16>().map_err(|e| {
            DbError::ConnectionFailed(format!("PSQL_PORT is not a valid port: {e}"))
        })?;

        Ok(DbConfig::new(
            var("PSQL_HOST", "localhost"),
            port,
            var("PSQL_USERNAME", "postgres"),
            var("PSQL_PASSWORD", ""),
            var("PSQL_DATABASE", "postgres"),
        ))
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

// =============================================================================
// Client Provider
// =============================================================================

/// Something that hands out [`DbClient`]s: the pool in production, an
/// in-memory store in service tests.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    type Connection: DbConnection;

    async fn client(&self) -> DbResult<DbClient<Self::Connection>>;
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle. Cheap to clone (the pool is reference-counted).
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Creates the connection pool.
    ///
    /// ## Returns
    /// * `Ok(Database)` - Ready-to-use database handle
    /// * `Err(DbError)` - Connection or migration failed
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Initializing database connection"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Database { pool }
    }

    /// Acquires a connection and wraps it in a [`DbClient`].
    ///
    /// The connection goes back to the pool when the client is dropped.
    pub async fn client(&self) -> DbResult<DbClient<PoolConnection<Postgres>>> {
        let conn = self.pool.acquire().await?;
        debug!("Acquired pooled connection");
        Ok(DbClient::new(conn))
    }

    /// Applies pending migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        let mut client = self.client().await?;
        let applied = MigrationRunner::default()
            .run(&mut client, Direction::Up)
            .await?;
        info!(applied = applied.len(), "Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the database connection pool.
    ///
    /// ## When To Call
    /// On application shutdown, after the HTTP server stopped.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[async_trait]
impl ClientProvider for Database {
    type Connection = PoolConnection<Postgres>;

    async fn client(&self) -> DbResult<DbClient<Self::Connection>> {
        Database::client(self).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
