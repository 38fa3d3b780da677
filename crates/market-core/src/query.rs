//! # Query Builder
//!
//! Compiles a structured filter / sort / pagination description into a
//! parameterized `SELECT` plus its ordered argument list.
//!
//! ## Compilation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        build_select("users", params)                    │
//! │                                                                         │
//! │   table ──► sanitize_identifier ──► SELECT * FROM users                 │
//! │                                                                         │
//! │   filters ──► per key, in order:                                        │
//! │               Equals(v)        → age = $1                               │
//! │               In([a, b])       → id IN ($2, $3)      ([] → FALSE)       │
//! │               Compare([..])    → (age > $4 AND age < $5)                │
//! │             joined with AND    → WHERE ...                              │
//! │                                                                         │
//! │   order_by ──► ORDER BY name [ASC|DESC]                                 │
//! │   page     ──► LIMIT $6 ──► OFFSET $7                                   │
//! │                                                                         │
//! │   Result: QueryPlan { sql, args }  with  $1..$n  ==  args[0..n]         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Injection Safety
//! Identifiers are stripped to `[A-Za-z0-9_]` (never escaped or quoted).
//! Values never appear in SQL text; they only travel in `args`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::value::SqlValue;

// =============================================================================
// Identifiers
// =============================================================================

/// Strips every character outside `[A-Za-z0-9_]`.
///
/// Idempotent: sanitizing an already sanitized name returns it unchanged.
///
/// ## Example
/// ```rust
/// use market_core::query::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("us;ers--").unwrap(), "users");
/// assert!(sanitize_identifier("';--").is_err());
/// ```
pub fn sanitize_identifier(raw: &str) -> QueryResult<String> {
    let clean: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if clean.is_empty() {
        return Err(QueryError::EmptyIdentifier {
            raw: raw.to_string(),
        });
    }

    Ok(clean)
}

// =============================================================================
// Comparison Operators
// =============================================================================

/// The closed set of comparison operators a filter may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

impl FromStr for CompareOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Ok(CompareOp::Eq),
            "neq" => Ok(CompareOp::Neq),
            "gt" => Ok(CompareOp::Gt),
            "gte" => Ok(CompareOp::Gte),
            "lt" => Ok(CompareOp::Lt),
            "lte" => Ok(CompareOp::Lte),
            _ => Err(QueryError::UnknownOperator(s.to_string())),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Condition on a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `col = $n`
    Equals(SqlValue),
    /// `col IN ($n, ...)`, or `FALSE` when empty
    In(Vec<SqlValue>),
    /// `(col OP $n AND ...)`, or no clause when empty
    Compare(Vec<(CompareOp, SqlValue)>),
}

/// Ordered column → [`Filter`] mapping.
///
/// Clauses (and therefore placeholders) follow insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    entries: Vec<(String, Filter)>,
}

impl Filters {
    pub fn new() -> Self {
        Filters::default()
    }

    /// Sets the filter for a column, replacing any earlier one in place.
    pub fn with(mut self, column: impl Into<String>, filter: Filter) -> Self {
        self.set(column.into(), filter);
        self
    }

    /// `column = value`
    pub fn eq(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.with(column, Filter::Equals(value.into()))
    }

    /// `column IN (values...)`
    pub fn any_of<V: Into<SqlValue>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.with(column, Filter::In(values.into_iter().map(Into::into).collect()))
    }

    /// Adds one comparison. Repeated calls on the same column accumulate
    /// into a single parenthesized group.
    pub fn compare(
        mut self,
        column: impl Into<String>,
        op: CompareOp,
        value: impl Into<SqlValue>,
    ) -> Self {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some((_, Filter::Compare(ops))) => ops.push((op, value)),
            _ => self.set(column, Filter::Compare(vec![(op, value)])),
        }
        self
    }

    /// Builds filters from a JSON object.
    ///
    /// ```text
    /// { "age": 30 }                     → age = $n
    /// { "id": [1, 2] }                  → id IN ($n, $n+1)
    /// { "age": { "gt": 18, "lt": 65 } } → (age > $n AND age < $n+1)
    /// ```
    pub fn from_json(spec: &serde_json::Map<String, serde_json::Value>) -> QueryResult<Self> {
        let mut filters = Filters::new();

        for (column, value) in spec {
            let filter = match value {
                serde_json::Value::Array(items) => {
                    Filter::In(items.iter().map(SqlValue::from_json).collect())
                }
                serde_json::Value::Object(ops) => {
                    let mut compare = Vec::with_capacity(ops.len());
                    for (op, operand) in ops {
                        if operand.is_array() || operand.is_object() {
                            return Err(QueryError::InvalidFilter {
                                column: column.clone(),
                                reason: format!("operand of '{op}' must be a scalar"),
                            });
                        }
                        compare.push((op.parse::<CompareOp>()?, SqlValue::from_json(operand)));
                    }
                    Filter::Compare(compare)
                }
                scalar => Filter::Equals(SqlValue::from_json(scalar)),
            };
            filters.set(column.clone(), filter);
        }

        Ok(filters)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Filter)> {
        self.entries.iter().map(|(name, filter)| (name.as_str(), filter))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn set(&mut self, column: String, filter: Filter) {
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = filter,
            None => self.entries.push((column, filter)),
        }
    }
}

// =============================================================================
// Ordering & Pagination
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(QueryError::UnknownDirection(s.to_string())),
        }
    }
}

/// `ORDER BY` clause. A bare column sorts ascending (the database default).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderBy {
    Column(String),
    Directed(String, SortDirection),
}

impl OrderBy {
    pub fn column(name: impl Into<String>) -> Self {
        OrderBy::Column(name.into())
    }

    pub fn asc(name: impl Into<String>) -> Self {
        OrderBy::Directed(name.into(), SortDirection::Asc)
    }

    pub fn desc(name: impl Into<String>) -> Self {
        OrderBy::Directed(name.into(), SortDirection::Desc)
    }

    fn to_sql(&self) -> QueryResult<String> {
        Ok(match self {
            OrderBy::Column(name) => sanitize_identifier(name)?,
            OrderBy::Directed(name, direction) => {
                format!("{} {}", sanitize_identifier(name)?, direction.as_sql())
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Everything `find_many` accepts besides the table name.
///
/// ## Example
/// ```rust
/// use market_core::query::{build_select, FindManyParams, Filters, OrderBy};
///
/// let params = FindManyParams::new()
///     .filters(Filters::new().eq("age", 30))
///     .order_by(OrderBy::column("name"))
///     .limit(10)
///     .offset(0);
///
/// let plan = build_select("users", &params).unwrap();
/// assert_eq!(
///     plan.sql,
///     "SELECT * FROM users WHERE age = $1 ORDER BY name LIMIT $2 OFFSET $3"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindManyParams {
    pub filters: Filters,
    pub page: Page,
    pub order_by: Option<OrderBy>,
}

impl FindManyParams {
    pub fn new() -> Self {
        FindManyParams::default()
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.page.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.page.offset = Some(offset);
        self
    }
}

// =============================================================================
// Query Plan
// =============================================================================

/// A compiled statement: SQL text with `$1..$n` and the `n` values to bind.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

impl QueryPlan {
    pub(crate) fn new(sql: String, args: Vec<SqlValue>) -> Self {
        let plan = QueryPlan { sql, args };
        debug_assert_eq!(plan.highest_placeholder(), plan.args.len());
        plan
    }

    /// Largest `$n` appearing in the SQL text (0 when there is none).
    pub fn highest_placeholder(&self) -> usize {
        let bytes = self.sql.as_bytes();
        let mut highest = 0;
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if let Ok(n) = self.sql[start..end].parse::<usize>() {
                    highest = highest.max(n);
                }
                i = end;
            } else {
                i += 1;
            }
        }
        highest
    }
}

/// Appends values and hands out their placeholders.
#[derive(Debug, Default)]
pub(crate) struct Binder {
    args: Vec<SqlValue>,
}

impl Binder {
    pub(crate) fn new() -> Self {
        Binder::default()
    }

    pub(crate) fn push(&mut self, value: impl Into<SqlValue>) -> String {
        self.args.push(value.into());
        format!("${}", self.args.len())
    }

    pub(crate) fn finish(self, sql: String) -> QueryPlan {
        QueryPlan::new(sql, self.args)
    }
}

// =============================================================================
// SELECT
// =============================================================================

/// Compiles `SELECT * FROM table` with the given filters, order and page.
pub fn build_select(table: &str, params: &FindManyParams) -> QueryResult<QueryPlan> {
    let table = sanitize_identifier(table)?;
    let mut binder = Binder::new();
    let mut sql = format!("SELECT * FROM {table}");

    let conditions = compile_filters(&params.filters, &mut binder)?;
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    if let Some(order_by) = &params.order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_by.to_sql()?);
    }

    if let Some(limit) = params.page.limit {
        let placeholder = binder.push(limit);
        sql.push_str(&format!(" LIMIT {placeholder}"));
    }

    if let Some(offset) = params.page.offset {
        let placeholder = binder.push(offset);
        sql.push_str(&format!(" OFFSET {placeholder}"));
    }

    Ok(binder.finish(sql))
}

fn compile_filters(filters: &Filters, binder: &mut Binder) -> QueryResult<Vec<String>> {
    let mut conditions = Vec::with_capacity(filters.len());

    for (column, filter) in filters.iter() {
        let column = sanitize_identifier(column)?;
        match filter {
            Filter::Equals(value) => {
                let placeholder = binder.push(value.clone());
                conditions.push(format!("{column} = {placeholder}"));
            }
            Filter::In(values) if values.is_empty() => conditions.push("FALSE".to_string()),
            Filter::In(values) => {
                let placeholders: Vec<String> =
                    values.iter().map(|v| binder.push(v.clone())).collect();
                conditions.push(format!("{column} IN ({})", placeholders.join(", ")));
            }
            Filter::Compare(ops) if ops.is_empty() => {}
            Filter::Compare(ops) => {
                let parts: Vec<String> = ops
                    .iter()
                    .map(|(op, value)| {
                        let placeholder = binder.push(value.clone());
                        format!("{column} {} {placeholder}", op.as_sql())
                    })
                    .collect();
                conditions.push(format!("({})", parts.join(" AND ")));
            }
        }
    }

    Ok(conditions)
}

// =============================================================================
// Unit Tests
// =============================================================================
