//! # Database Migrations
//!
//! Embedded up/down SQL migrations and the runner that applies them.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  migrate up | down                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CREATE TABLE IF NOT EXISTS migrations (id, name UNIQUE, executed_at)  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  up:   1_add_users_table → 2_add_transactions_table                    │
//! │  down: 2_add_transactions_table → 1_add_users_table                    │
//! │       │                                                                 │
//! │       ├── up and already recorded?    skip                             │
//! │       ├── down and not recorded?      skip                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  one transaction per migration:                                        │
//! │     script  +  INSERT INTO migrations / DELETE FROM migrations         │
//! │       │                                                                 │
//! │       └── failure → ROLLBACK, stop, DbError::Migration                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create `migrations/<N>_<description>.up.sql` and `.down.sql`
//! 2. Append an entry to [`MIGRATIONS`]
//! 3. **NEVER** modify existing migrations - always add new ones

use std::fmt;
use std::str::FromStr;

use market_core::{Filters, FindManyParams, IsolationLevel, Record, SqlValue};
use thiserror::Error;
use tracing::{error, info};

use crate::client::DbClient;
use crate::connection::DbConnection;
use crate::error::{DbError, DbResult};

/// Bookkeeping table of applied migrations.
pub const MIGRATIONS_TABLE: &str = "migrations";

const INIT_SQL: &str = "CREATE TABLE IF NOT EXISTS migrations (
    id SERIAL PRIMARY KEY,
    name VARCHAR(255) UNIQUE NOT NULL,
    executed_at TIMESTAMP NOT NULL DEFAULT NOW()
)";

/// One schema change with its inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

/// All migrations, in apply order.
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        name: "1_add_users_table",
        up: include_str!("../migrations/1_add_users_table.up.sql"),
        down: include_str!("../migrations/1_add_users_table.down.sql"),
    },
    Migration {
        name: "2_add_transactions_table",
        up: include_str!("../migrations/2_add_transactions_table.up.sql"),
        down: include_str!("../migrations/2_add_transactions_table.down.sql"),
    },
];

// =============================================================================
// Direction
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown migration direction '{0}' (expected up or down)")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

// =============================================================================
// Runner
// =============================================================================

/// Applies or reverts a list of migrations through a [`DbClient`].
#[derive(Debug, Clone, Copy)]
pub struct MigrationRunner {
    migrations: &'static [Migration],
}

impl Default for MigrationRunner {
    fn default() -> Self {
        MigrationRunner::new(MIGRATIONS)
    }
}

impl MigrationRunner {
    pub fn new(migrations: &'static [Migration]) -> Self {
        MigrationRunner { migrations }
    }

    /// Creates the bookkeeping table if needed.
    pub async fn init<C: DbConnection>(&self, client: &mut DbClient<C>) -> DbResult<()> {
        client.execute_script(INIT_SQL).await.map_err(|source| {
            error!(error = %source, "Failed to initialize migrations table");
            DbError::Migration {
                name: "init".to_string(),
                direction: Direction::Up.as_str(),
                source: Box::new(source),
            }
        })
    }

    /// Runs every pending migration in `direction`, stopping at the first
    /// failure. Returns the names that were applied (or reverted).
    pub async fn run<C: DbConnection>(
        &self,
        client: &mut DbClient<C>,
        direction: Direction,
    ) -> DbResult<Vec<&'static str>> {
        self.init(client).await?;

        let ordered: Vec<Migration> = match direction {
            Direction::Up => self.migrations.to_vec(),
            Direction::Down => self.migrations.iter().rev().copied().collect(),
        };

        let mut done = Vec::new();
        for migration in ordered {
            let applied = is_applied(client, migration.name).await?;
            let pending = match direction {
                Direction::Up => !applied,
                Direction::Down => applied,
            };

            if !pending {
                info!(
                    migration = migration.name,
                    "Migration {}",
                    if applied { "already applied" } else { "not applied" }
                );
                continue;
            }

            info!(migration = migration.name, %direction, "Starting migration");
            apply(client, migration, direction).await.map_err(|source| {
                error!(
                    migration = migration.name,
                    %direction,
                    error = %source,
                    code = ?source.code(),
                    detail = ?source.detail(),
                    hint = ?source.hint(),
                    "Migration failed and was rolled back"
                );
                DbError::Migration {
                    name: migration.name.to_string(),
                    direction: direction.as_str(),
                    source: Box::new(source),
                }
            })?;
            info!(migration = migration.name, %direction, "Migration completed");
            done.push(migration.name);
        }

        Ok(done)
    }

    /// Every known migration with whether it is recorded as applied.
    pub async fn status<C: DbConnection>(
        &self,
        client: &mut DbClient<C>,
    ) -> DbResult<Vec<(&'static str, bool)>> {
        self.init(client).await?;

        let mut status = Vec::with_capacity(self.migrations.len());
        for migration in self.migrations {
            status.push((migration.name, is_applied(client, migration.name).await?));
        }
        Ok(status)
    }
}

async fn is_applied<C: DbConnection>(client: &mut DbClient<C>, name: &str) -> DbResult<bool> {
    let params = FindManyParams::new()
        .filters(Filters::new().eq("name", name))
        .limit(1);
    let rows: Vec<Record> = client.find_many(MIGRATIONS_TABLE, &params).await?;
    Ok(!rows.is_empty())
}

async fn apply<C: DbConnection>(
    client: &mut DbClient<C>,
    migration: Migration,
    direction: Direction,
) -> DbResult<()> {
    client
        .transaction(IsolationLevel::ReadCommitted, move |tx| {
            Box::pin(async move {
                match direction {
                    Direction::Up => {
                        tx.execute_script(migration.up).await?;
                        tx.create::<Record>(
                            MIGRATIONS_TABLE,
                            &Record::new().with("name", migration.name),
                        )
                        .await?;
                    }
                    Direction::Down => {
                        tx.execute_script(migration.down).await?;
                        tx.bulk_delete::<Record>(
                            MIGRATIONS_TABLE,
                            &[SqlValue::from(migration.name)],
                            "name",
                        )
                        .await?;
                    }
                }
                Ok::<(), DbError>(())
            })
        })
        .await
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::fake::FakeConnection;

    fn recorded(name: &str) -> Vec<Record> {
        vec![Record::new().with("id", 1).with("name", name)]
    }

    #[tokio::test]
    async fn test_up_applies_in_order() {
        let mut conn = FakeConnection::new();
        conn.respond(vec![]);
        conn.respond(recorded("1_add_users_table"));
        conn.respond(vec![]);
        conn.respond(recorded("2_add_transactions_table"));
        let mut client = DbClient::new(conn);

        let applied = MigrationRunner::default()
            .run(&mut client, Direction::Up)
            .await
            .unwrap();

        assert_eq!(applied, vec!["1_add_users_table", "2_add_transactions_table"]);

        let statements = client.connection().statements();
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS migrations"));
        assert_eq!(
            statements[1],
            "SELECT * FROM migrations WHERE name = $1 LIMIT $2"
        );
        assert_eq!(statements[2], "BEGIN ISOLATION LEVEL READ COMMITTED");
        assert!(statements[3].starts_with("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\""));
        assert_eq!(
            statements[4],
            "INSERT INTO migrations (name) VALUES ($1) RETURNING *"
        );
        assert_eq!(statements[5], "COMMIT");
        assert!(statements[8].starts_with("CREATE TYPE tx_type"));
        assert_eq!(statements.len(), 11);
    }

    #[tokio::test]
    async fn test_up_skips_applied() {
        let mut conn = FakeConnection::new();
        conn.respond(recorded("1_add_users_table"));
        conn.respond(recorded("2_add_transactions_table"));
        let mut client = DbClient::new(conn);

        let applied = MigrationRunner::default()
            .run(&mut client, Direction::Up)
            .await
            .unwrap();

        assert!(applied.is_empty());
        assert!(!client.connection().statements().contains(&"COMMIT"));
    }

    #[tokio::test]
    async fn test_down_reverts_in_reverse_order() {
        let mut conn = FakeConnection::new();
        conn.respond(recorded("2_add_transactions_table"));
        conn.respond(recorded("2_add_transactions_table"));
        conn.respond(vec![]);
        let mut client = DbClient::new(conn);

        let reverted = MigrationRunner::default()
            .run(&mut client, Direction::Down)
            .await
            .unwrap();

        assert_eq!(reverted, vec!["2_add_transactions_table"]);
        let statements = client.connection().statements();
        assert!(statements[3].starts_with("DROP TABLE IF EXISTS transactions"));
        assert_eq!(
            statements[4],
            "DELETE FROM migrations WHERE name IN ($1) RETURNING *"
        );
        assert_eq!(statements[5], "COMMIT");
    }

    #[tokio::test]
    async fn test_failed_migration_rolls_back_and_stops() {
        let mut conn = FakeConnection::new();
        conn.respond(vec![]);
        conn.respond(recorded("1_add_users_table"));
        conn.respond(vec![]);
        conn.fail_on(
            "CREATE TYPE",
            DriverError::new("type \"tx_type\" already exists").with_code("42710"),
        );
        let mut client = DbClient::new(conn);

        let err = MigrationRunner::default()
            .run(&mut client, Direction::Up)
            .await
            .unwrap_err();

        match &err {
            DbError::Migration { name, direction, .. } => {
                assert_eq!(name, "2_add_transactions_table");
                assert_eq!(*direction, "up");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.code(), Some("42710"));
        assert_eq!(client.connection().statements().last(), Some(&"ROLLBACK"));
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("up".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("down".parse::<Direction>().unwrap(), Direction::Down);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_embedded_migrations_have_both_scripts() {
        for migration in MIGRATIONS {
            assert!(!migration.up.trim().is_empty(), "{} up", migration.name);
            assert!(!migration.down.trim().is_empty(), "{} down", migration.name);
        }
    }
}
