//! # Migration Runner
//!
//! Applies or reverts the embedded schema migrations.
//!
//! ## Usage
//! ```bash
//! # Apply pending migrations (default)
//! cargo run -p market-db --bin migrate
//!
//! # Revert applied migrations, newest first
//! cargo run -p market-db --bin migrate -- down
//!
//! # Show which migrations are applied
//! cargo run -p market-db --bin migrate -- status
//! ```
//!
//! Connection settings come from `PSQL_HOST`, `PSQL_PORT`, `PSQL_USERNAME`,
//! `PSQL_PASSWORD` and `PSQL_DATABASE` (a `.env` file is loaded if present).

use std::env;

use anyhow::Context;
use market_db::migrations::{Direction, MigrationRunner};
use market_db::{Database, DbConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(env::var("LOG_LEVEL").unwrap_or("info".into()))),
        )
        .with_target(false)
        .init();

    let command = env::args().nth(1).unwrap_or_else(|| "up".to_string());

    if command == "--help" || command == "-h" {
        println!("Usage: migrate [up|down|status]");
        println!();
        println!("  up       Apply pending migrations in order (default)");
        println!("  down     Revert applied migrations in reverse order");
        println!("  status   List migrations and whether they are applied");
        return Ok(());
    }

    let config = DbConfig::from_env()?.max_connections(1);
    let db = Database::new(config)
        .await
        .context("could not connect to PostgreSQL")?;
    let mut client = db.client().await?;
    let runner = MigrationRunner::default();

    if command == "status" {
        for (name, applied) in runner.status(&mut client).await? {
            println!("[{}] {name}", if applied { "x" } else { " " });
        }
    } else {
        let direction: Direction = command.parse()?;
        let done = runner.run(&mut client, direction).await?;
        info!(%direction, count = done.len(), "Migrations finished");
    }

    drop(client);
    db.close().await;
    Ok(())
}
