//! # Statement Builders
//!
//! Single-table CRUD statements, their bulk variants, and transaction control.
//!
//! Every builder:
//! - sanitizes the table and column names (see [`sanitize_identifier`])
//! - binds every value positionally, never inlining it
//! - ends data-changing statements with `RETURNING *`
//!
//! ## Statement Shapes
//! ```text
//! insert        INSERT INTO t (a, b) VALUES ($1, $2) RETURNING *
//! find_unique   SELECT * FROM t WHERE id = $1 LIMIT 1
//! increment     UPDATE t SET f = f + $1 WHERE id = $2 RETURNING *
//! update        UPDATE t SET a = $1, b = $2 WHERE id = $3 RETURNING *
//! delete        DELETE FROM t WHERE id = $1 RETURNING *
//!
//! bulk_insert   INSERT INTO t (a, b) VALUES ($1, $2), ($3, $4) RETURNING *
//! bulk_update   UPDATE t SET a = CASE id WHEN $1 THEN $3 WHEN $2 THEN $4 END
//!               WHERE id IN ($1, $2) RETURNING *
//! bulk_delete   DELETE FROM t WHERE id IN ($1, $2) RETURNING *
//! ```
//!
//! Bulk builders return `Ok(None)` for empty input: there is nothing to send.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::query::{sanitize_identifier, Binder, QueryPlan};
use crate::value::{Record, SqlValue};

/// Primary-key column used by the single-row builders.
pub const ID_COLUMN: &str = "id";

pub const COMMIT: &str = "COMMIT";
pub const ROLLBACK: &str = "ROLLBACK";

// =============================================================================
// Isolation Levels
// =============================================================================

/// Transaction isolation level.
///
/// ## Levels
/// ```text
/// ReadUncommitted  - treated as READ COMMITTED by PostgreSQL
/// ReadCommitted    - default; each statement sees committed data
/// RepeatableRead   - snapshot per transaction
/// Serializable     - concurrent conflicting transactions fail instead of
///                    observing stale reads (used by `buy`)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// `BEGIN ISOLATION LEVEL <level>`
    pub fn begin_statement(self) -> String {
        format!("BEGIN ISOLATION LEVEL {}", self.as_sql())
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

// =============================================================================
// Single-row statements
// =============================================================================

/// `INSERT ... RETURNING *`. Columns follow the record's insertion order.
pub fn insert(table: &str, fields: &Record) -> QueryResult<QueryPlan> {
    let table = sanitize_identifier(table)?;

    if fields.is_empty() {
        return Ok(QueryPlan::new(
            format!("INSERT INTO {table} DEFAULT VALUES RETURNING *"),
            Vec::new(),
        ));
    }

    let mut binder = Binder::new();
    let mut columns = Vec::with_capacity(fields.len());
    let mut placeholders = Vec::with_capacity(fields.len());
    for (column, value) in fields.iter() {
        columns.push(sanitize_identifier(column)?);
        placeholders.push(binder.push(value.clone()));
    }

    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({}) RETURNING *",
        columns.join(", "),
        placeholders.join(", ")
    );
    Ok(binder.finish(sql))
}

pub fn find_unique(table: &str, id: impl Into<SqlValue>) -> QueryResult<QueryPlan> {
    let table = sanitize_identifier(table)?;
    let mut binder = Binder::new();
    let placeholder = binder.push(id);
    Ok(binder.finish(format!(
        "SELECT * FROM {table} WHERE {ID_COLUMN} = {placeholder} LIMIT 1"
    )))
}

/// `UPDATE t SET field = field + $1 WHERE id = $2 RETURNING *`
///
/// The arithmetic happens in the database, so concurrent increments never
/// lose an update.
pub fn increment(
    table: &str,
    id: impl Into<SqlValue>,
    field: &str,
    amount: impl Into<SqlValue>,
) -> QueryResult<QueryPlan> {
    adjust(table, id, field, '+', amount.into())
}

/// `UPDATE t SET field = field - $1 WHERE id = $2 RETURNING *`
pub fn decrement(
    table: &str,
    id: impl Into<SqlValue>,
    field: &str,
    amount: impl Into<SqlValue>,
) -> QueryResult<QueryPlan> {
    adjust(table, id, field, '-', amount.into())
}

fn adjust(
    table: &str,
    id: impl Into<SqlValue>,
    field: &str,
    sign: char,
    amount: SqlValue,
) -> QueryResult<QueryPlan> {
    let table = sanitize_identifier(table)?;
    let field = sanitize_identifier(field)?;
    let mut binder = Binder::new();
    let amount = binder.push(amount);
    let id = binder.push(id);
    Ok(binder.finish(format!(
        "UPDATE {table} SET {field} = {field} {sign} {amount} WHERE {ID_COLUMN} = {id} RETURNING *"
    )))
}

/// `UPDATE t SET a = $1, ... WHERE id = $n RETURNING *`
///
/// An update with no fields is rejected rather than sent as invalid SQL.
pub fn update(table: &str, id: impl Into<SqlValue>, fields: &Record) -> QueryResult<QueryPlan> {
    let table = sanitize_identifier(table)?;
    if fields.is_empty() {
        return Err(QueryError::EmptyUpdate { table });
    }

    let mut binder = Binder::new();
    let mut assignments = Vec::with_capacity(fields.len());
    for (column, value) in fields.iter() {
        let column = sanitize_identifier(column)?;
        assignments.push(format!("{column} = {}", binder.push(value.clone())));
    }
    let id = binder.push(id);

    Ok(binder.finish(format!(
        "UPDATE {table} SET {} WHERE {ID_COLUMN} = {id} RETURNING *",
        assignments.join(", ")
    )))
}

pub fn delete(table: &str, id: impl Into<SqlValue>) -> QueryResult<QueryPlan> {
    let table = sanitize_identifier(table)?;
    let mut binder = Binder::new();
    let id = binder.push(id);
    Ok(binder.finish(format!(
        "DELETE FROM {table} WHERE {ID_COLUMN} = {id} RETURNING *"
    )))
}

// =============================================================================
// Bulk statements
// =============================================================================

/// One multi-row `INSERT`.
///
/// The column list comes from the first record; every other record must have
/// exactly the same columns (in any order). Values are bound in the first
/// record's column order.
pub fn bulk_insert(table: &str, records: &[Record]) -> QueryResult<Option<QueryPlan>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };

    let table = sanitize_identifier(table)?;
    if first.is_empty() {
        return Err(QueryError::NoColumns { table });
    }

    let names: Vec<&str> = first.columns().collect();
    let columns = names
        .iter()
        .map(|name| sanitize_identifier(name))
        .collect::<QueryResult<Vec<_>>>()?;

    let mut binder = Binder::new();
    let mut rows = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        if !record.same_columns(first) {
            return Err(QueryError::ColumnMismatch { index });
        }
        let placeholders: Vec<String> = names
            .iter()
            .map(|name| binder.push(record.get(name).cloned().unwrap_or(SqlValue::Null)))
            .collect();
        rows.push(format!("({})", placeholders.join(", ")));
    }

    Ok(Some(binder.finish(format!(
        "INSERT INTO {table} ({}) VALUES {} RETURNING *",
        columns.join(", "),
        rows.join(", ")
    ))))
}

/// One `UPDATE ... SET col = CASE key WHEN ... END` covering every record.
///
/// ## Placeholder Layout
/// With `R` records and non-key columns `c0..ck` (first record's order):
/// ```text
/// args:  [ key_0 .. key_{R-1},  c0_0 .. c0_{R-1},  c1_0 .. c1_{R-1}, ... ]
///          $1 .. $R             $R+1 .. $2R        $2R+1 .. $3R
///
/// value of column i for record j  →  $(R + i*R + j + 1)
/// ```
/// The `WHEN` arms and the trailing `IN (...)` reuse the key placeholders.
pub fn bulk_update(table: &str, records: &[Record], key: &str) -> QueryResult<Option<QueryPlan>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };

    let table = sanitize_identifier(table)?;
    let key_column = sanitize_identifier(key)?;
    let row_count = records.len();

    let mut args = Vec::with_capacity(row_count * first.len());
    for (index, record) in records.iter().enumerate() {
        let value = record.get(key).ok_or_else(|| QueryError::MissingKey {
            index,
            key: key.to_string(),
        })?;
        if index > 0 && !record.same_columns(first) {
            return Err(QueryError::ColumnMismatch { index });
        }
        args.push(value.clone());
    }

    let names: Vec<&str> = first.columns().filter(|name| *name != key).collect();
    if names.is_empty() {
        return Err(QueryError::NoColumns { table });
    }

    let mut assignments = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let column = sanitize_identifier(name)?;
        let arms: Vec<String> = (0..row_count)
            .map(|j| format!("WHEN ${} THEN ${}", j + 1, row_count + i * row_count + j + 1))
            .collect();
        assignments.push(format!(
            "{column} = CASE {key_column} {} END",
            arms.join(" ")
        ));
        args.extend(
            records
                .iter()
                .map(|record| record.get(name).cloned().unwrap_or(SqlValue::Null)),
        );
    }

    let keys: Vec<String> = (1..=row_count).map(|n| format!("${n}")).collect();
    let sql = format!(
        "UPDATE {table} SET {} WHERE {key_column} IN ({}) RETURNING *",
        assignments.join(", "),
        keys.join(", ")
    );

    Ok(Some(QueryPlan::new(sql, args)))
}

/// `DELETE FROM t WHERE key IN (...) RETURNING *`
pub fn bulk_delete(table: &str, ids: &[SqlValue], key: &str) -> QueryResult<Option<QueryPlan>> {
    if ids.is_empty() {
        return Ok(None);
    }

    let table = sanitize_identifier(table)?;
    let key = sanitize_identifier(key)?;
    let mut binder = Binder::new();
    let placeholders: Vec<String> = ids.iter().map(|id| binder.push(id.clone())).collect();

    Ok(Some(binder.finish(format!(
        "DELETE FROM {table} WHERE {key} IN ({}) RETURNING *",
        placeholders.join(", ")
    ))))
}

// =============================================================================
// Unit Tests
// =============================================================================
