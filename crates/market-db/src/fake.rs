//! Scripted in-memory connection for unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use market_core::{Record, SqlValue};

use crate::connection::DbConnection;
use crate::error::DriverError;

/// Records every statement; answers `fetch_all` from a queue of canned
/// results and fails statements that start with a configured prefix.
#[derive(Debug, Default)]
pub struct FakeConnection {
    calls: Vec<(String, Vec<SqlValue>)>,
    responses: VecDeque<Vec<Record>>,
    failures: Vec<(String, DriverError)>,
    stalls: Vec<String>,
    discarded: bool,
}

impl FakeConnection {
    pub fn new() -> Self {
        FakeConnection::default()
    }

    /// Queues the rows returned by the next `fetch_all`.
    pub fn respond(&mut self, rows: Vec<Record>) {
        self.responses.push_back(rows);
    }

    /// Fails every statement starting with `prefix`.
    pub fn fail_on(&mut self, prefix: &str, error: DriverError) {
        self.failures.push((prefix.to_string(), error));
    }

    /// The next statement starting with `prefix` never completes.
    pub fn stall_on(&mut self, prefix: &str) {
        self.stalls.push(prefix.to_string());
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub fn calls(&self) -> &[(String, Vec<SqlValue>)] {
        &self.calls
    }

    pub fn statements(&self) -> Vec<&str> {
        self.calls.iter().map(|(sql, _)| sql.as_str()).collect()
    }

    async fn check(&mut self, sql: &str, args: &[SqlValue]) -> Result<(), DriverError> {
        self.calls.push((sql.to_string(), args.to_vec()));

        let sql = sql.trim_start();
        if let Some(pos) = self.stalls.iter().position(|p| sql.starts_with(p.as_str())) {
            self.stalls.remove(pos);
            futures::future::pending::<()>().await;
        }

        match self
            .failures
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
        {
            Some((_, error)) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DbConnection for FakeConnection {
    async fn fetch_all(
        &mut self,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<Vec<Record>, DriverError> {
        self.check(sql, args).await?;
        Ok(self.responses.pop_front().unwrap_or_default())
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<(), DriverError> {
        self.check(sql, &[]).await
    }

    fn discard(&mut self) {
        self.discarded = true;
    }
}
