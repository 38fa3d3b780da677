//! In-memory stand-ins for the database, the cache and the pricing API.
//!
//! [`MemoryStore`] understands exactly the statements the users service
//! sends. SERIALIZABLE transactions read from a snapshot taken at BEGIN and
//! fail COMMIT with SQLSTATE 40001 when a row they changed was committed by
//! someone else in the meantime. Every statement yields to the scheduler
//! first, so `tokio::join!` interleaves concurrent requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_core::types::{Currency, SkinportItem, Transaction, TxType};
use market_core::{FromSqlValue, Record, SqlValue};
use market_db::{ClientProvider, DbClient, DbConnection, DbResult, DriverError};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::services::{CacheError, ItemCache, PriceSource, PriceSourceError};

// =============================================================================
// Database
// =============================================================================

#[derive(Debug, Clone)]
struct StoredUser {
    balance: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl StoredUser {
    fn to_record(&self, id: Uuid) -> Record {
        Record::new()
            .with("id", id)
            .with("balance", self.balance)
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    users: HashMap<Uuid, StoredUser>,
    transactions: Vec<Transaction>,
}

#[derive(Debug, Default)]
struct OpenTransaction {
    snapshot: Option<HashMap<Uuid, StoredUser>>,
    deltas: HashMap<Uuid, Decimal>,
    new_users: HashMap<Uuid, StoredUser>,
    new_transactions: Vec<Transaction>,
}

/// Shared in-memory `users` / `transactions` tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    /// Committed balance of a user.
    pub fn balance(&self, id: Uuid) -> Option<Decimal> {
        self.lock().users.get(&id).map(|user| user.balance)
    }

    /// Committed transaction rows in insertion order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().transactions.clone()
    }
}

#[async_trait]
impl ClientProvider for MemoryStore {
    type Connection = MemoryConnection;

    async fn client(&self) -> DbResult<DbClient<MemoryConnection>> {
        Ok(DbClient::new(MemoryConnection {
            store: self.clone(),
            open: None,
        }))
    }
}

/// One session against a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
    open: Option<OpenTransaction>,
}

fn unsupported(sql: &str) -> DriverError {
    DriverError::new(format!("unsupported statement: {sql}")).with_code("42601")
}

fn arg<T: FromSqlValue>(args: &[SqlValue], index: usize) -> Result<T, DriverError> {
    args.get(index)
        .and_then(T::from_sql_value)
        .ok_or_else(|| DriverError::new(format!("bad argument ${}", index + 1)).with_code("22023"))
}

impl MemoryConnection {
    /// The row as this session sees it.
    fn visible_user(&self, state: &StoreState, id: Uuid) -> Option<StoredUser> {
        let Some(open) = &self.open else {
            return state.users.get(&id).cloned();
        };

        let base = match &open.snapshot {
            Some(snapshot) => snapshot.get(&id).cloned(),
            None => state.users.get(&id).cloned(),
        }
        .or_else(|| open.new_users.get(&id).cloned());

        base.map(|mut user| {
            if let Some(delta) = open.deltas.get(&id) {
                user.balance += *delta;
            }
            user
        })
    }

    fn begin(&mut self, sql: &str) -> Result<(), DriverError> {
        if self.open.is_some() {
            return Err(DriverError::new("there is already a transaction in progress"));
        }

        let state = self.store.lock();
        let isolated = sql.ends_with("SERIALIZABLE") || sql.ends_with("REPEATABLE READ");
        self.open = Some(OpenTransaction {
            snapshot: isolated.then(|| state.users.clone()),
            ..OpenTransaction::default()
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        let Some(open) = &self.open else {
            return Ok(());
        };
        let mut state = self.store.lock();

        if let Some(snapshot) = &open.snapshot {
            let conflict = open.deltas.keys().any(|id| {
                snapshot.get(id).map(|user| user.version)
                    != state.users.get(id).map(|user| user.version)
            });
            if conflict {
                return Err(DriverError::new(
                    "could not serialize access due to concurrent update",
                )
                .with_code("40001"));
            }
        }

        for (id, user) in &open.new_users {
            state.users.insert(*id, user.clone());
        }
        for (id, delta) in &open.deltas {
            if let Some(user) = state.users.get_mut(id) {
                user.balance += *delta;
                user.version += 1;
            }
        }
        state.transactions.extend(open.new_transactions.iter().cloned());
        drop(state);

        self.open = None;
        Ok(())
    }

    fn insert_user(&mut self, args: &[SqlValue]) -> Result<Record, DriverError> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let user = StoredUser {
            balance: arg(args, 0)?,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        let record = user.to_record(id);

        match &mut self.open {
            Some(open) => {
                open.new_users.insert(id, user);
            }
            None => {
                self.store.lock().users.insert(id, user);
            }
        }
        Ok(record)
    }

    fn insert_transaction(&mut self, args: &[SqlValue]) -> Result<Record, DriverError> {
        let user_id: Uuid = arg(args, 0)?;
        let label: String = arg(args, 1)?;
        let tx_type: TxType = label
            .parse()
            .map_err(|_| DriverError::new(format!("invalid input value for enum tx_type: \"{label}\"")))?;

        let visible = {
            let state = self.store.lock();
            self.visible_user(&state, user_id).is_some()
        };
        if !visible {
            return Err(DriverError::new(
                "insert or update on table \"transactions\" violates foreign key constraint",
            )
            .with_code("23503"));
        }

        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id,
            tx_type,
            value: arg(args, 2)?,
            created_at: Utc::now(),
        };
        let record = Record::new()
            .with("id", transaction.id)
            .with("user_id", transaction.user_id)
            .with("type", transaction.tx_type)
            .with("value", transaction.value)
            .with("created_at", transaction.created_at);

        match &mut self.open {
            Some(open) => open.new_transactions.push(transaction),
            None => self.store.lock().transactions.push(transaction),
        }
        Ok(record)
    }

    fn adjust_balance(&mut self, sql: &str, args: &[SqlValue]) -> Result<Vec<Record>, DriverError> {
        let amount: Decimal = arg(args, 0)?;
        let id: Uuid = arg(args, 1)?;
        let delta = if sql.contains("balance - $1") { -amount } else { amount };

        let exists = {
            let state = self.store.lock();
            self.visible_user(&state, id).is_some()
        };
        if !exists {
            return Ok(Vec::new());
        }

        match &mut self.open {
            Some(open) => {
                *open.deltas.entry(id).or_default() += delta;
            }
            None => {
                let mut state = self.store.lock();
                if let Some(user) = state.users.get_mut(&id) {
                    user.balance += delta;
                    user.version += 1;
                }
            }
        }

        let state = self.store.lock();
        Ok(self
            .visible_user(&state, id)
            .map(|user| vec![user.to_record(id)])
            .unwrap_or_default())
    }
}

#[async_trait]
impl DbConnection for MemoryConnection {
    async fn fetch_all(
        &mut self,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<Vec<Record>, DriverError> {
        tokio::task::yield_now().await;

        if sql == "SELECT * FROM users WHERE id = $1 LIMIT 1" {
            let id: Uuid = arg(args, 0)?;
            let state = self.store.lock();
            return Ok(self
                .visible_user(&state, id)
                .map(|user| vec![user.to_record(id)])
                .unwrap_or_default());
        }
        if sql.starts_with("INSERT INTO users ") {
            return Ok(vec![self.insert_user(args)?]);
        }
        if sql.starts_with("INSERT INTO transactions ") {
            return Ok(vec![self.insert_transaction(args)?]);
        }
        if sql.starts_with("UPDATE users SET balance = balance ") {
            return self.adjust_balance(sql, args);
        }

        Err(unsupported(sql))
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<(), DriverError> {
        tokio::task::yield_now().await;

        match sql {
            "COMMIT" => self.commit(),
            "ROLLBACK" => {
                self.open = None;
                Ok(())
            }
            begin if begin.starts_with("BEGIN ISOLATION LEVEL ") => self.begin(begin),
            other => Err(unsupported(other)),
        }
    }
}

// =============================================================================
// Cache
// =============================================================================

/// `HashMap`-backed [`ItemCache`] recording the TTL of every write.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, (Vec<SkinportItem>, Duration)>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache::default()
    }

    pub fn put(&self, key: &str, items: Vec<SkinportItem>) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (items, Duration::from_secs(60)));
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries.lock().unwrap().get(key).map(|(_, ttl)| *ttl)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ItemCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<SkinportItem>>, CacheError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .map(|(items, _)| items.clone()))
    }

    async fn set(
        &self,
        key: &str,
        items: &[SkinportItem],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (items.to_vec(), ttl));
        Ok(())
    }
}

// =============================================================================
// Pricing API
// =============================================================================

/// Canned price lists keyed by `(app_id, tradable)`; counts calls.
#[derive(Debug, Clone, Default)]
pub struct StubPriceSource {
    lists: Arc<Mutex<HashMap<(u32, bool), Vec<SkinportItem>>>>,
    calls: Arc<AtomicUsize>,
    failing: bool,
    stalling: bool,
}

impl StubPriceSource {
    pub fn new() -> Self {
        StubPriceSource::default()
    }

    /// A source whose every call fails with HTTP 503.
    pub fn failing() -> Self {
        StubPriceSource {
            failing: true,
            ..StubPriceSource::default()
        }
    }

    /// A source whose calls never complete.
    pub fn stalling() -> Self {
        StubPriceSource {
            stalling: true,
            ..StubPriceSource::default()
        }
    }

    pub fn with_list(self, app_id: u32, tradable: bool, items: Vec<SkinportItem>) -> Self {
        self.lists.lock().unwrap().insert((app_id, tradable), items);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for StubPriceSource {
    async fn fetch_items(
        &self,
        app_id: u32,
        _currency: Currency,
        tradable: bool,
    ) -> Result<Vec<SkinportItem>, PriceSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stalling {
            futures::future::pending::<()>().await;
        }
        if self.failing {
            return Err(PriceSourceError::Status {
                status: 503,
                url: "stub://items".to_string(),
            });
        }
        Ok(self
            .lists
            .lock()
            .unwrap()
            .get(&(app_id, tradable))
            .cloned()
            .unwrap_or_default())
    }
}

/// `SkinportItem` in EUR.
pub fn item(name: &str, min_price: Option<f64>) -> SkinportItem {
    SkinportItem {
        market_hash_name: name.to_string(),
        currency: Currency::Eur,
        min_price,
    }
}
