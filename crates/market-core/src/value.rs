//! # Values and Records
//!
//! The two data shapes that cross the boundary between the query builder
//! and the database:
//!
//! - [`SqlValue`] - one bound argument or one column value
//! - [`Record`]   - one row, as an ordered column → value mapping
//!
//! ## Where Values Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Service ── Record::new().with("balance", 0) ──┐                        │
//! │                                                │                        │
//! │                                                ▼                        │
//! │                          statement::insert("users", &fields)            │
//! │                                                │                        │
//! │                     QueryPlan { sql, args: Vec<SqlValue> }              │
//! │                                                │                        │
//! │                                                ▼                        │
//! │                              PostgreSQL (bound $1..$n)                  │
//! │                                                │                        │
//! │                          rows ──► Record ──► FromRecord ──► User        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A record has no identity tracking: it is plain key-value data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::RecordError;

// =============================================================================
// SqlValue
// =============================================================================

/// A value that can be bound to a positional placeholder or read from a row.
///
/// ## Why an explicit enum?
/// Every argument carries its PostgreSQL type with it, so a bound `Uuid`
/// compares against a `uuid` column and an [`SqlValue::Enum`] inserts into a
/// custom enum column without casts in the SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    /// A label of a PostgreSQL enum type, e.g. `tx_type` / `'DEPOSIT'`.
    Enum {
        type_name: &'static str,
        label: String,
    },
}

impl SqlValue {
    /// Creates an enum-typed value.
    pub fn enumeration(type_name: &'static str, label: impl Into<String>) -> Self {
        SqlValue::Enum {
            type_name,
            label: label.into(),
        }
    }

    /// Short type name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "integer",
            SqlValue::Float(_) => "float",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Text(_) => "text",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Json(_) => "json",
            SqlValue::Enum { .. } => "enum",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Converts a JSON scalar into a bindable value.
    ///
    /// Integers become [`SqlValue::Int`], other numbers [`SqlValue::Float`];
    /// arrays and objects are kept whole as [`SqlValue::Json`].
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value as J;
        match value {
            J::Null => SqlValue::Null,
            J::Bool(b) => SqlValue::Bool(*b),
            J::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => SqlValue::Float(n.as_f64().unwrap_or_default()),
            },
            J::String(s) => SqlValue::Text(s.clone()),
            J::Array(_) | J::Object(_) => SqlValue::Json(value.clone()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::Int(v) => serializer.serialize_i64(*v),
            SqlValue::Float(v) => serializer.serialize_f64(*v),
            SqlValue::Decimal(v) => Serialize::serialize(v, serializer),
            SqlValue::Text(v) => serializer.serialize_str(v),
            SqlValue::Uuid(v) => Serialize::serialize(v, serializer),
            SqlValue::Timestamp(v) => Serialize::serialize(v, serializer),
            SqlValue::Json(v) => Serialize::serialize(v, serializer),
            SqlValue::Enum { label, .. } => serializer.serialize_str(label),
        }
    }
}

// =============================================================================
// Reading typed values
// =============================================================================

/// Conversion from a column value into a Rust type.
pub trait FromSqlValue: Sized {
    /// Name used in [`RecordError::TypeMismatch`].
    const EXPECTED: &'static str;

    /// Returns `None` when the value has an incompatible type.
    fn from_sql_value(value: &SqlValue) -> Option<Self>;
}

impl FromSqlValue for bool {
    const EXPECTED: &'static str = "bool";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromSqlValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromSqlValue for f64 {
    const EXPECTED: &'static str = "float";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Float(v) => Some(*v),
            SqlValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl FromSqlValue for Decimal {
    const EXPECTED: &'static str = "decimal";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Decimal(v) => Some(*v),
            SqlValue::Int(v) => Some(Decimal::from(*v)),
            _ => None,
        }
    }
}

impl FromSqlValue for String {
    const EXPECTED: &'static str = "text";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Text(v) => Some(v.clone()),
            SqlValue::Enum { label, .. } => Some(label.clone()),
            _ => None,
        }
    }
}

impl FromSqlValue for Uuid {
    const EXPECTED: &'static str = "uuid";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Uuid(v) => Some(*v),
            SqlValue::Text(v) => Uuid::parse_str(v).ok(),
            _ => None,
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    const EXPECTED: &'static str = "timestamp";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromSqlValue for serde_json::Value {
    const EXPECTED: &'static str = "json";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Json(v) => Some(v.clone()),
            _ => None,
        }
    }
}

// =============================================================================
// Record
// =============================================================================

/// One row as an ordered column → value mapping.
///
/// Insertion order is preserved: `insert` uses it as the column list order,
/// and rows read from the database keep the result-set column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, SqlValue)>,
}

impl Record {
    pub fn new() -> Self {
        Record { fields: Vec::new() }
    }

    /// Builder-style insert.
    ///
    /// ## Example
    /// ```rust
    /// use market_core::Record;
    ///
    /// let fields = Record::new().with("id", 1).with("name", "John Doe");
    /// assert_eq!(fields.columns().collect::<Vec<_>>(), ["id", "name"]);
    /// ```
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets a column. Replaces the value in place if the column exists,
    /// otherwise appends it.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn remove(&mut self, column: &str) -> Option<SqlValue> {
        let index = self.fields.iter().position(|(name, _)| name == column)?;
        Some(self.fields.remove(index).1)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when both records have exactly the same column names,
    /// regardless of order.
    pub fn same_columns(&self, other: &Record) -> bool {
        self.len() == other.len() && self.columns().all(|column| other.contains(column))
    }

    /// Reads a column as `T`.
    pub fn try_get<T: FromSqlValue>(&self, column: &str) -> Result<T, RecordError> {
        let value = self.get(column).ok_or_else(|| RecordError::Missing {
            column: column.to_string(),
        })?;

        T::from_sql_value(value).ok_or_else(|| RecordError::TypeMismatch {
            column: column.to_string(),
            expected: T::EXPECTED,
            found: value.kind(),
        })
    }

    /// Reads a nullable column. A missing column is still an error.
    pub fn try_get_opt<T: FromSqlValue>(&self, column: &str) -> Result<Option<T>, RecordError> {
        match self.get(column) {
            Some(SqlValue::Null) => Ok(None),
            Some(_) => self.try_get(column).map(Some),
            None => Err(RecordError::Missing {
                column: column.to_string(),
            }),
        }
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, SqlValue);
    type IntoIter = std::vec::IntoIter<(String, SqlValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

// =============================================================================
// FromRecord
// =============================================================================

/// Maps a row to a typed struct.
///
/// ## Example
/// ```rust
/// use market_core::{FromRecord, Record, RecordError};
///
/// struct Counter { hits: i64 }
///
/// impl FromRecord for Counter {
///     fn from_record(record: Record) -> Result<Self, RecordError> {
///         Ok(Counter { hits: record.try_get("hits")? })
///     }
/// }
///
/// let counter = Counter::from_record(Record::new().with("hits", 3_i64)).unwrap();
/// assert_eq!(counter.hits, 3);
/// ```
pub trait FromRecord: Sized {
    fn from_record(record: Record) -> Result<Self, RecordError>;
}

impl FromRecord for Record {
    fn from_record(record: Record) -> Result<Self, RecordError> {
        Ok(record)
    }
}

// =============================================================================
// sqlx binding (feature = "sqlx")
// =============================================================================

#[cfg(feature = "sqlx")]
mod pg {
    use sqlx::encode::IsNull;
    use sqlx::error::BoxDynError;
    use sqlx::postgres::types::Oid;
    use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo};
    use sqlx::{Encode, Postgres, Type};

    use super::SqlValue;

    impl Type<Postgres> for SqlValue {
        fn type_info() -> PgTypeInfo {
            <String as Type<Postgres>>::type_info()
        }

        // The concrete type is reported per value by `produces`.
        fn compatible(_ty: &PgTypeInfo) -> bool {
            true
        }
    }

    impl<'q> Encode<'q, Postgres> for SqlValue {
        fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
            match self {
                SqlValue::Null => Ok(IsNull::Yes),
                SqlValue::Bool(v) => <bool as Encode<'q, Postgres>>::encode_by_ref(v, buf),
                SqlValue::Int(v) => <i64 as Encode<'q, Postgres>>::encode_by_ref(v, buf),
                SqlValue::Float(v) => <f64 as Encode<'q, Postgres>>::encode_by_ref(v, buf),
                SqlValue::Decimal(v) => {
                    <rust_decimal::Decimal as Encode<'q, Postgres>>::encode_by_ref(v, buf)
                }
                SqlValue::Text(v) => <String as Encode<'q, Postgres>>::encode_by_ref(v, buf),
                SqlValue::Uuid(v) => <uuid::Uuid as Encode<'q, Postgres>>::encode_by_ref(v, buf),
                SqlValue::Timestamp(v) => {
                    <chrono::DateTime<chrono::Utc> as Encode<'q, Postgres>>::encode_by_ref(v, buf)
                }
                SqlValue::Json(v) => {
                    <serde_json::Value as Encode<'q, Postgres>>::encode_by_ref(v, buf)
                }
                // Enum labels travel as their text representation.
                SqlValue::Enum { label, .. } => {
                    <String as Encode<'q, Postgres>>::encode_by_ref(label, buf)
                }
            }
        }

        fn produces(&self) -> Option<PgTypeInfo> {
            Some(match self {
                // Unspecified type: PostgreSQL infers it from the placeholder's context.
                SqlValue::Null => PgTypeInfo::with_oid(Oid(0)),
                SqlValue::Bool(_) => <bool as Type<Postgres>>::type_info(),
                SqlValue::Int(_) => <i64 as Type<Postgres>>::type_info(),
                SqlValue::Float(_) => <f64 as Type<Postgres>>::type_info(),
                SqlValue::Decimal(_) => <rust_decimal::Decimal as Type<Postgres>>::type_info(),
                SqlValue::Text(_) => <String as Type<Postgres>>::type_info(),
                SqlValue::Uuid(_) => <uuid::Uuid as Type<Postgres>>::type_info(),
                SqlValue::Timestamp(_) => {
                    <chrono::DateTime<chrono::Utc> as Type<Postgres>>::type_info()
                }
                SqlValue::Json(_) => <serde_json::Value as Type<Postgres>>::type_info(),
                SqlValue::Enum { type_name, .. } => PgTypeInfo::with_name(type_name),
            })
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
