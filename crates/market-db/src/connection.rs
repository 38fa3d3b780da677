//! # Connection Seam
//!
//! The two primitives [`DbClient`](crate::DbClient) needs from a database
//! connection, and their PostgreSQL implementation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbClient<C: DbConnection>                                              │
//! │       │                                                                 │
//! │       ├── fetch_all(sql, args)  extended protocol, $n bound, rows back  │
//! │       └── execute_raw(sql)      simple protocol: BEGIN / COMMIT / DDL   │
//! │                                                                         │
//! │  impl for PgConnection              ← migrate binary, tests             │
//! │  impl for PoolConnection<Postgres>  ← Database::client()                │
//! │  impl for test fakes                ← scripted responses                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use market_core::{Record, SqlValue};
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgQueryResult, PgRow, Postgres};
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};
use uuid::Uuid;

use crate::error::DriverError;

/// A single database connection, used sequentially.
#[async_trait]
pub trait DbConnection: Send {
    /// Runs one parameterized statement and returns every produced row.
    async fn fetch_all(&mut self, sql: &str, args: &[SqlValue])
        -> Result<Vec<Record>, DriverError>;

    /// Runs SQL without parameters. May contain several statements.
    async fn execute_raw(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Marks the connection as unfit for reuse. Called when a transaction
    /// was abandoned mid-flight; pooled connections are closed instead of
    /// being returned.
    fn discard(&mut self) {}
}

type RawExecution<'a> = Pin<Box<dyn Future<Output = Result<PgQueryResult, sqlx::Error>> + Send + 'a>>;

#[async_trait]
impl DbConnection for PgConnection {
    async fn fetch_all(
        &mut self,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<Vec<Record>, DriverError> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = query.bind(arg.clone());
        }

        let rows = query.fetch_all(&mut *self).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<(), DriverError> {
        // Boxed with an explicit type: the `Executor` impl is not general
        // enough for the borrow async-trait would infer otherwise.
        let execution: RawExecution<'_> = Box::pin(Executor::execute(self, sqlx::raw_sql(sql)));
        execution.await?;
        Ok(())
    }
}

#[async_trait]
impl DbConnection for PoolConnection<Postgres> {
    async fn fetch_all(
        &mut self,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<Vec<Record>, DriverError> {
        DbConnection::fetch_all(&mut **self, sql, args).await
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<(), DriverError> {
        DbConnection::execute_raw(&mut **self, sql).await
    }

    fn discard(&mut self) {
        self.close_on_drop();
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Converts a row into a [`Record`] keeping the result-set column order.
fn decode_row(row: &PgRow) -> Result<Record, DriverError> {
    let mut record = Record::new();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())?;
        record.insert(column.name(), value);
    }
    Ok(record)
}

/// Maps a column by its PostgreSQL type name.
///
/// ```text
/// BOOL                      → Bool
/// INT2 / INT4 / INT8        → Int
/// FLOAT4 / FLOAT8           → Float
/// NUMERIC                   → Decimal
/// UUID                      → Uuid
/// TIMESTAMPTZ / TIMESTAMP   → Timestamp (TIMESTAMP read as UTC)
/// JSON / JSONB              → Json
/// anything else             → Text (enum labels, varchar, ...)
/// ```
fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let value = match type_name {
        "BOOL" => SqlValue::Bool(row.try_get(index)?),
        "INT2" => SqlValue::Int(row.try_get::<i16, _>(index)?.into()),
        "INT4" => SqlValue::Int(row.try_get::<i32, _>(index)?.into()),
        "INT8" => SqlValue::Int(row.try_get(index)?),
        "FLOAT4" => SqlValue::Float(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" => SqlValue::Float(row.try_get(index)?),
        "NUMERIC" => SqlValue::Decimal(row.try_get::<Decimal, _>(index)?),
        "UUID" => SqlValue::Uuid(row.try_get::<Uuid, _>(index)?),
        "TIMESTAMPTZ" => SqlValue::Timestamp(row.try_get::<DateTime<Utc>, _>(index)?),
        "TIMESTAMP" => SqlValue::Timestamp(row.try_get::<NaiveDateTime, _>(index)?.and_utc()),
        "DATE" => SqlValue::Text(row.try_get::<NaiveDate, _>(index)?.to_string()),
        "JSON" | "JSONB" => SqlValue::Json(row.try_get::<serde_json::Value, _>(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => SqlValue::Text(row.try_get(index)?),
        // User-defined enums arrive as their label.
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
    };

    Ok(value)
}
