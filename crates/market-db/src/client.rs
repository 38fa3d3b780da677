//! # Transactional Data Client
//!
//! [`DbClient`] runs market-core statements on one owned connection and maps
//! the returned rows to typed records.
//!
//! ## Transaction State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   IDLE ──► BEGIN ISOLATION LEVEL L ──► unit(&mut client)               │
//! │    ▲              │ fails                   │                           │
//! │    │              └──► error (nothing else) │                           │
//! │    │                                        ├── Ok(v)  ──► COMMIT       │
//! │    │                                        │               │ fails     │
//! │    │                                        │               ▼           │
//! │    │                                        │         commit error      │
//! │    │                                        ├── Err(e) ──► ROLLBACK     │
//! │    │                                        │               │ fails     │
//! │    │                                        │               ▼           │
//! │    │                                        │         RollbackFailed    │
//! │    │                                        ├── panic ──► ROLLBACK,     │
//! │    │                                        │             resume panic  │
//! │    │                                        └── dropped ─► discard conn,│
//! │    │                                                 ROLLBACK on reuse  │
//! │    └────────────────────────────────────────────────────────────────── │
//! │                                                                         │
//! │   COMMIT and ROLLBACK are never both issued for one transaction.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let mut client = db.client().await?;
//!
//! let user: User = client
//!     .transaction(IsolationLevel::ReadCommitted, move |tx| {
//!         Box::pin(async move {
//!             tx.create::<Record>("transactions", &row).await?;
//!             tx.increment("users", id, "balance", value)
//!                 .await?
//!                 .ok_or_else(|| DbError::Aborted("User not found!".into()))
//!         })
//!     })
//!     .await?;
//! ```

use std::panic::{resume_unwind, AssertUnwindSafe};

use futures::future::BoxFuture;
use futures::FutureExt;
use market_core::statement::{self, COMMIT, ROLLBACK};
use market_core::{
    build_select, FindManyParams, FromRecord, IsolationLevel, QueryPlan, Record, SqlValue,
};
use tracing::{debug, error, trace, warn};

use crate::connection::DbConnection;
use crate::error::{DbError, DbResult, DriverError};

/// Executes statements on a single connection.
///
/// Every method takes `&mut self`: a client is used by one task at a time,
/// and statements run in exactly the order they are awaited.
#[derive(Debug)]
pub struct DbClient<C> {
    conn: C,
    in_transaction: bool,
    abandoned: bool,
}

impl<C: DbConnection> DbClient<C> {
    pub fn new(conn: C) -> Self {
        DbClient {
            conn,
            in_transaction: false,
            abandoned: false,
        }
    }

    /// Gives the connection back (to return it to a pool early, for example).
    pub fn into_inner(self) -> C {
        self.conn
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    // =========================================================================
    // Execution
    // =========================================================================

    async fn run(&mut self, context: &'static str, plan: &QueryPlan) -> DbResult<Vec<Record>> {
        self.rollback_abandoned().await?;
        trace!(sql = %plan.sql, args = ?plan.args, "Executing query");

        match self.conn.fetch_all(&plan.sql, &plan.args).await {
            Ok(rows) => Ok(rows),
            Err(err) => {
                error!(
                    sql = %plan.sql,
                    args = ?plan.args,
                    code = ?err.code,
                    detail = ?err.detail,
                    hint = ?err.hint,
                    error = %err.message,
                    "{context}"
                );
                Err(DbError::query(context, &plan.sql, err))
            }
        }
    }

    async fn run_raw(&mut self, context: &'static str, sql: &str) -> DbResult<()> {
        self.rollback_abandoned().await?;
        trace!(sql = %sql, "Executing statement");

        self.conn.execute_raw(sql).await.map_err(|err| {
            error!(
                sql = %sql,
                code = ?err.code,
                detail = ?err.detail,
                hint = ?err.hint,
                error = %err.message,
                "{context}"
            );
            DbError::query(context, sql, err)
        })
    }

    async fn run_one<T: FromRecord>(
        &mut self,
        context: &'static str,
        plan: QueryPlan,
    ) -> DbResult<Option<T>> {
        let rows = self.run(context, &plan).await?;
        rows.into_iter()
            .next()
            .map(T::from_record)
            .transpose()
            .map_err(DbError::from)
    }

    async fn run_many<T: FromRecord>(
        &mut self,
        context: &'static str,
        plan: Option<QueryPlan>,
    ) -> DbResult<Vec<T>> {
        let Some(plan) = plan else {
            return Ok(Vec::new());
        };

        let rows = self.run(context, &plan).await?;
        rows.into_iter()
            .map(|row| T::from_record(row).map_err(DbError::from))
            .collect()
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Inserts one row and returns it as stored (defaults filled in).
    pub async fn create<T: FromRecord>(&mut self, table: &str, fields: &Record) -> DbResult<T> {
        const CONTEXT: &str = "Failed to create record";

        let plan = statement::insert(table, fields)?;
        let sql = plan.sql.clone();
        self.run_one(CONTEXT, plan).await?.ok_or_else(|| {
            DbError::query(CONTEXT, &sql, DriverError::new("insert returned no row"))
        })
    }

    pub async fn find_unique<T: FromRecord>(
        &mut self,
        table: &str,
        id: impl Into<SqlValue>,
    ) -> DbResult<Option<T>> {
        let plan = statement::find_unique(table, id)?;
        self.run_one("Failed to find record", plan).await
    }

    pub async fn find_many<T: FromRecord>(
        &mut self,
        table: &str,
        params: &FindManyParams,
    ) -> DbResult<Vec<T>> {
        let plan = build_select(table, params)?;
        self.run_many("Failed to find records", Some(plan)).await
    }

    /// Adds `amount` to `field` in the database; `None` if no row has `id`.
    pub async fn increment<T: FromRecord>(
        &mut self,
        table: &str,
        id: impl Into<SqlValue>,
        field: &str,
        amount: impl Into<SqlValue>,
    ) -> DbResult<Option<T>> {
        let plan = statement::increment(table, id, field, amount)?;
        self.run_one("Failed to increment record", plan).await
    }

    /// Subtracts `amount` from `field` in the database; `None` if no row has `id`.
    pub async fn decrement<T: FromRecord>(
        &mut self,
        table: &str,
        id: impl Into<SqlValue>,
        field: &str,
        amount: impl Into<SqlValue>,
    ) -> DbResult<Option<T>> {
        let plan = statement::decrement(table, id, field, amount)?;
        self.run_one("Failed to decrement record", plan).await
    }

    pub async fn update<T: FromRecord>(
        &mut self,
        table: &str,
        id: impl Into<SqlValue>,
        fields: &Record,
    ) -> DbResult<Option<T>> {
        let plan = statement::update(table, id, fields)?;
        self.run_one("Failed to update record", plan).await
    }

    pub async fn delete<T: FromRecord>(
        &mut self,
        table: &str,
        id: impl Into<SqlValue>,
    ) -> DbResult<Option<T>> {
        let plan = statement::delete(table, id)?;
        self.run_one("Failed to delete record", plan).await
    }

    // =========================================================================
    // Bulk
    // =========================================================================

    /// Inserts all records in one statement. Empty input sends nothing.
    pub async fn bulk_insert<T: FromRecord>(
        &mut self,
        table: &str,
        records: &[Record],
    ) -> DbResult<Vec<T>> {
        let plan = statement::bulk_insert(table, records)?;
        self.run_many("Failed to bulk insert records", plan).await
    }

    /// Updates all records in one statement, matching rows on `key`.
    pub async fn bulk_update<T: FromRecord>(
        &mut self,
        table: &str,
        records: &[Record],
        key: &str,
    ) -> DbResult<Vec<T>> {
        let plan = statement::bulk_update(table, records, key)?;
        self.run_many("Failed to bulk update records", plan).await
    }

    pub async fn bulk_delete<T: FromRecord>(
        &mut self,
        table: &str,
        ids: &[SqlValue],
        key: &str,
    ) -> DbResult<Vec<T>> {
        let plan = statement::bulk_delete(table, ids, key)?;
        self.run_many("Failed to bulk delete records", plan).await
    }

    /// Runs trusted, parameterless SQL (migration scripts).
    pub async fn execute_script(&mut self, sql: &str) -> DbResult<()> {
        self.run_raw("Failed to execute script", sql).await
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Runs `unit` inside `BEGIN ISOLATION LEVEL <level>`.
    ///
    /// ## Outcome
    /// - `Ok(v)`: COMMIT, then `Ok(v)`. A failed COMMIT is returned as the
    ///   error; the server has already ended the transaction.
    /// - `Err(e)`: ROLLBACK, then `Err(e)`. If the ROLLBACK itself fails the
    ///   result is [`DbError::RollbackFailed`] carrying both errors.
    /// - panic: ROLLBACK, then the panic continues.
    /// - dropped before completion: the connection is discarded and the
    ///   client sends ROLLBACK before its next statement.
    ///
    /// Calling `transaction` on the client handed to `unit` fails with
    /// [`DbError::NestedTransaction`] without sending anything.
    pub async fn transaction<T, F>(&mut self, level: IsolationLevel, unit: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut DbClient<C>) -> BoxFuture<'c, DbResult<T>>,
    {
        self.rollback_abandoned().await?;
        if self.in_transaction {
            return Err(DbError::NestedTransaction);
        }

        self.run_raw("Failed to begin transaction", &level.begin_statement())
            .await?;
        self.in_transaction = true;
        debug!(isolation = %level, "Transaction started");

        let mut guard = OpenTransaction { client: self };
        let outcome = AssertUnwindSafe(unit(&mut *guard.client)).catch_unwind().await;

        let result = match outcome {
            Ok(Ok(value)) => guard
                .client
                .run_raw("Failed to commit transaction", COMMIT)
                .await
                .map(|()| {
                    debug!(isolation = %level, "Transaction committed");
                    value
                }),
            Ok(Err(err)) => Err(guard.client.rollback(err).await),
            Err(panic) => {
                if let Err(rollback) = guard.client.conn.execute_raw(ROLLBACK).await {
                    error!(error = %rollback, "Rollback after panic failed");
                }
                guard.client.in_transaction = false;
                resume_unwind(panic);
            }
        };

        guard.client.in_transaction = false;
        result
    }

    /// Ends a transaction whose future was dropped mid-flight.
    async fn rollback_abandoned(&mut self) -> DbResult<()> {
        if !self.abandoned {
            return Ok(());
        }

        self.abandoned = false;
        self.in_transaction = false;
        warn!("Rolling back abandoned transaction");
        self.conn.execute_raw(ROLLBACK).await.map_err(|err| {
            error!(error = %err.message, code = ?err.code, "Rollback of abandoned transaction failed");
            DbError::query("Failed to roll back abandoned transaction", ROLLBACK, err)
        })
    }

    async fn rollback(&mut self, cause: DbError) -> DbError {
        match self.conn.execute_raw(ROLLBACK).await {
            Ok(()) => {
                debug!(error = %cause, "Transaction rolled back");
                cause
            }
            Err(rollback) => {
                error!(
                    error = %cause,
                    rollback_error = %rollback,
                    code = ?rollback.code,
                    "Rollback failed"
                );
                DbError::RollbackFailed {
                    cause: Box::new(cause),
                    rollback,
                }
            }
        }
    }
}

/// Borrow of a client between BEGIN and COMMIT/ROLLBACK.
///
/// Dropping it while the client is still in a transaction means the
/// transaction future was cancelled (a request timeout, for example).
struct OpenTransaction<'a, C: DbConnection> {
    client: &'a mut DbClient<C>,
}

impl<C: DbConnection> Drop for OpenTransaction<'_, C> {
    fn drop(&mut self) {
        if self.client.in_transaction {
            warn!("Transaction dropped before completion, discarding connection");
            self.client.abandoned = true;
            self.client.conn.discard();
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeConnection;
    use market_core::{Filters, OrderBy};

    fn client() -> DbClient<FakeConnection> {
        DbClient::new(FakeConnection::new())
    }

    #[tokio::test]
    async fn test_find_many_sends_plan() {
        let mut client = client();
        client.connection_mut().respond(vec![Record::new().with("id", 1)]);

        let params = FindManyParams::new()
            .filters(Filters::new().eq("age", 30))
            .order_by(OrderBy::column("name"))
            .limit(10)
            .offset(0);
        let rows: Vec<Record> = client.find_many("users", &params).await.unwrap();

        assert_eq!(rows.len(), 1);
        let (sql, args) = &client.connection().calls()[0];
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE age = $1 ORDER BY name LIMIT $2 OFFSET $3"
        );
        assert_eq!(
            args,
            &vec![SqlValue::Int(30), SqlValue::Int(10), SqlValue::Int(0)]
        );
    }

    #[tokio::test]
    async fn test_find_unique_none_when_no_row() {
        let mut client = client();

        let row: Option<Record> = client.find_unique("users", 1).await.unwrap();

        assert!(row.is_none());
        assert_eq!(
            client.connection().statements(),
            vec!["SELECT * FROM users WHERE id = $1 LIMIT 1"]
        );
    }

    #[tokio::test]
    async fn test_create_returns_row() {
        let mut client = client();
        client
            .connection_mut()
            .respond(vec![Record::new().with("id", 1).with("name", "John Doe")]);

        let fields = Record::new().with("id", 1).with("name", "John Doe");
        let row: Record = client.create("users", &fields).await.unwrap();

        assert_eq!(row.get("name"), Some(&SqlValue::Text("John Doe".into())));
        assert_eq!(
            client.connection().statements(),
            vec!["INSERT INTO users (id, name) VALUES ($1, $2) RETURNING *"]
        );
    }

    #[tokio::test]
    async fn test_driver_error_carries_context_and_fields() {
        let mut client = client();
        client.connection_mut().fail_on(
            "UPDATE",
            DriverError::new("relation \"users\" does not exist")
                .with_code("42P01")
                .with_hint("create the table first"),
        );

        let err = client
            .increment::<Record>("users", 1, "balance", 5)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Failed to increment record - relation \"users\" does not exist"
        );
        assert_eq!(err.code(), Some("42P01"));
        assert_eq!(err.hint(), Some("create the table first"));
    }

    #[tokio::test]
    async fn test_bulk_empty_input_sends_nothing() {
        let mut client = client();

        let inserted: Vec<Record> = client.bulk_insert("users", &[]).await.unwrap();
        let updated: Vec<Record> = client.bulk_update("users", &[], "id").await.unwrap();
        let deleted: Vec<Record> = client.bulk_delete("users", &[], "id").await.unwrap();

        assert!(inserted.is_empty() && updated.is_empty() && deleted.is_empty());
        assert!(client.connection().statements().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_query_sends_nothing() {
        let mut client = client();

        let err = client
            .update::<Record>("users", 1, &Record::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::InvalidQuery(_)));
        assert!(client.connection().statements().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_commits_on_success() {
        let mut client = client();
        client.connection_mut().respond(vec![Record::new().with("id", 1)]);

        let value = client
            .transaction(IsolationLevel::Serializable, |tx| {
                Box::pin(async move {
                    let row: Option<Record> = tx.find_unique("users", 1).await?;
                    Ok::<_, DbError>(row.is_some())
                })
            })
            .await
            .unwrap();

        assert!(value);
        assert!(!client.in_transaction());
        assert_eq!(
            client.connection().statements(),
            vec![
                "BEGIN ISOLATION LEVEL SERIALIZABLE",
                "SELECT * FROM users WHERE id = $1 LIMIT 1",
                "COMMIT",
            ]
        );
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let mut client = client();

        let err = client
            .transaction(IsolationLevel::ReadCommitted, |_tx| {
                Box::pin(async move {
                    Err::<(), _>(DbError::Aborted("User balance can't be less than zero!".into()))
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "User balance can't be less than zero!");
        assert_eq!(
            client.connection().statements(),
            vec!["BEGIN ISOLATION LEVEL READ COMMITTED", "ROLLBACK"]
        );
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_query_failure() {
        let mut client = client();
        client.connection_mut().fail_on(
            "INSERT",
            DriverError::new("insert or update violates foreign key constraint").with_code("23503"),
        );

        let err = client
            .transaction(IsolationLevel::ReadCommitted, |tx| {
                Box::pin(async move {
                    tx.create::<Record>("transactions", &Record::new().with("user_id", 7))
                        .await
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Query { .. }));
        assert_eq!(err.code(), Some("23503"));
        assert!(!client.in_transaction());
        assert_eq!(
            client.connection().statements(),
            vec![
                "BEGIN ISOLATION LEVEL READ COMMITTED",
                "INSERT INTO transactions (user_id) VALUES ($1) RETURNING *",
                "ROLLBACK",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_commit_is_not_rolled_back() {
        let mut client = client();
        client.connection_mut().fail_on(
            "COMMIT",
            DriverError::new("could not serialize access").with_code("40001"),
        );

        let err = client
            .transaction(IsolationLevel::Serializable, |_tx| {
                Box::pin(async move { Ok::<(), DbError>(()) })
            })
            .await
            .unwrap_err();

        assert!(err.is_serialization_failure());
        assert_eq!(
            client.connection().statements(),
            vec!["BEGIN ISOLATION LEVEL SERIALIZABLE", "COMMIT"]
        );
        assert!(!client.in_transaction());
    }

    #[tokio::test]
    async fn test_transaction_rollback_failure_keeps_both_errors() {
        let mut client = client();
        client
            .connection_mut()
            .fail_on("ROLLBACK", DriverError::new("connection reset"));

        let err = client
            .transaction(IsolationLevel::ReadCommitted, |_tx| {
                Box::pin(async move { Err::<(), _>(DbError::Aborted("boom".into())) })
            })
            .await
            .unwrap_err();

        match err {
            DbError::RollbackFailed { cause, rollback } => {
                assert!(matches!(*cause, DbError::Aborted(ref m) if m == "boom"));
                assert_eq!(rollback.message, "connection reset");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_begin_failure_issues_nothing_else() {
        let mut client = client();
        client
            .connection_mut()
            .fail_on("BEGIN", DriverError::new("too many connections"));

        let err = client
            .transaction(IsolationLevel::ReadCommitted, |_tx| {
                Box::pin(async move { Ok::<(), DbError>(()) })
            })
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("Failed to begin transaction"));
        assert_eq!(client.connection().statements().len(), 1);
        assert!(!client.in_transaction());
    }

    #[tokio::test]
    async fn test_nested_transaction_rejected() {
        let mut client = client();

        let err = client
            .transaction(IsolationLevel::ReadCommitted, |tx| {
                Box::pin(async move {
                    tx.transaction(IsolationLevel::Serializable, |_inner| {
                        Box::pin(async move { Ok::<(), DbError>(()) })
                    })
                    .await
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::NestedTransaction));
        assert_eq!(
            client.connection().statements(),
            vec!["BEGIN ISOLATION LEVEL READ COMMITTED", "ROLLBACK"]
        );
    }

    #[tokio::test]
    async fn test_panic_in_unit_rolls_back_and_resumes() {
        let mut client = client();

        let explode = true;
        let outcome = AssertUnwindSafe(client.transaction(IsolationLevel::ReadCommitted, |_tx| {
            Box::pin(async move {
                if explode {
                    panic!("unit exploded");
                }
                Ok::<(), DbError>(())
            })
        }))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert!(!client.in_transaction());
        assert_eq!(
            client.connection().statements(),
            vec!["BEGIN ISOLATION LEVEL READ COMMITTED", "ROLLBACK"]
        );
    }

    #[tokio::test]
    async fn test_client_reusable_after_transaction() {
        let mut client = client();

        let _ = client
            .transaction(IsolationLevel::ReadCommitted, |_tx| {
                Box::pin(async move { Err::<(), _>(DbError::Aborted("first".into())) })
            })
            .await;
        client
            .transaction(IsolationLevel::RepeatableRead, |_tx| {
                Box::pin(async move { Ok::<(), DbError>(()) })
            })
            .await
            .unwrap();

        assert_eq!(
            client.connection().statements(),
            vec![
                "BEGIN ISOLATION LEVEL READ COMMITTED",
                "ROLLBACK",
                "BEGIN ISOLATION LEVEL REPEATABLE READ",
                "COMMIT",
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_connection_and_rolls_back_on_reuse() {
        let mut client = client();
        client.connection_mut().stall_on("INSERT");

        let pending = client
            .transaction(IsolationLevel::Serializable, |tx| {
                Box::pin(async move {
                    tx.create::<Record>("transactions", &Record::new().with("v", 1))
                        .await
                })
            })
            .now_or_never();

        assert!(pending.is_none());
        assert!(client.connection().is_discarded());
        assert_eq!(
            client.connection().statements(),
            vec![
                "BEGIN ISOLATION LEVEL SERIALIZABLE",
                "INSERT INTO transactions (v) VALUES ($1) RETURNING *",
            ]
        );

        client
            .transaction(IsolationLevel::ReadCommitted, |_tx| {
                Box::pin(async move { Ok::<(), DbError>(()) })
            })
            .await
            .unwrap();

        assert!(!client.in_transaction());
        assert_eq!(
            client.connection().statements()[2..],
            [
                "ROLLBACK",
                "BEGIN ISOLATION LEVEL READ COMMITTED",
                "COMMIT",
            ]
        );
    }

    #[tokio::test]
    async fn test_statement_after_dropped_transaction_rolls_back_first() {
        let mut client = client();
        client.connection_mut().stall_on("COMMIT");

        let pending = client
            .transaction(IsolationLevel::ReadCommitted, |_tx| {
                Box::pin(async move { Ok::<(), DbError>(()) })
            })
            .now_or_never();
        assert!(pending.is_none());

        let row: Option<Record> = client.find_unique("users", 1).await.unwrap();

        assert!(row.is_none());
        assert_eq!(
            client.connection().statements(),
            vec![
                "BEGIN ISOLATION LEVEL READ COMMITTED",
                "COMMIT",
                "ROLLBACK",
                "SELECT * FROM users WHERE id = $1 LIMIT 1",
            ]
        );
    }
}
