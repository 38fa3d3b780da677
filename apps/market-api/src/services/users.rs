//! # Users Service
//!
//! Balances and the two ways to move them.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  deposit(id, value)   READ COMMITTED                                    │
//! │      INSERT INTO transactions (user_id, type, value) ... 'DEPOSIT'      │
//! │      UPDATE users SET balance = balance + $1 WHERE id = $2              │
//! │                                                                         │
//! │  buy(id, value)       SERIALIZABLE                                      │
//! │      INSERT INTO transactions (user_id, type, value) ... 'BUY'          │
//! │      UPDATE users SET balance = balance - $1 WHERE id = $2              │
//! │      balance < 0 → abort (ROLLBACK)                                     │
//! │                                                                         │
//! │  Two concurrent buys read the same snapshot; the second COMMIT fails   │
//! │  with SQLSTATE 40001 and its writes are discarded.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use market_core::types::{Transaction, TxType, User, TRANSACTIONS_TABLE, USERS_TABLE};
use market_core::validation::validate_amount;
use market_core::{IsolationLevel, Record};
use market_db::{ClientProvider, DbError};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiResult;

pub const BALANCE_COLUMN: &str = "balance";

/// Reason a purchase is aborted.
pub const NEGATIVE_BALANCE: &str = "User balance can't be less than zero!";

/// User balance operations. Each call acquires its own client.
#[derive(Debug, Clone)]
pub struct UsersService<P> {
    db: P,
}

impl<P: ClientProvider> UsersService<P> {
    pub fn new(db: P) -> Self {
        UsersService { db }
    }

    pub async fn get_user(&self, id: Uuid) -> ApiResult<Option<User>> {
        let mut client = self.db.client().await?;
        Ok(client.find_unique(USERS_TABLE, id).await?)
    }

    /// Registers a user with a zero balance.
    pub async fn add_user(&self) -> ApiResult<User> {
        let mut client = self.db.client().await?;
        let user: User = client
            .create(
                USERS_TABLE,
                &Record::new().with(BALANCE_COLUMN, Decimal::ZERO),
            )
            .await?;

        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Adds `value` to the balance and records a `DEPOSIT`.
    ///
    /// `Ok(None)` when the user does not exist.
    pub async fn deposit(&self, id: Uuid, value: Decimal) -> ApiResult<Option<User>> {
        let value = validate_amount(value)?;
        let mut client = self.db.client().await?;

        let user = client
            .transaction(IsolationLevel::ReadCommitted, move |tx| {
                Box::pin(async move {
                    tx.create::<Transaction>(
                        TRANSACTIONS_TABLE,
                        &Transaction::new_row(id, TxType::Deposit, value),
                    )
                    .await?;
                    tx.increment::<User>(USERS_TABLE, id, BALANCE_COLUMN, value)
                        .await
                })
            })
            .await?;

        if let Some(user) = &user {
            info!(user_id = %user.id, %value, balance = %user.balance, "Deposit completed");
        }
        Ok(user)
    }

    /// Subtracts `value` from the balance and records a `BUY`.
    ///
    /// Runs SERIALIZABLE so two purchases cannot both spend the same funds.
    /// A purchase that would leave a negative balance is rolled back.
    pub async fn buy(&self, id: Uuid, value: Decimal) -> ApiResult<Option<User>> {
        let value = validate_amount(value)?;
        let mut client = self.db.client().await?;

        let result = client
            .transaction(IsolationLevel::Serializable, move |tx| {
                Box::pin(async move {
                    tx.create::<Transaction>(
                        TRANSACTIONS_TABLE,
                        &Transaction::new_row(id, TxType::Buy, value),
                    )
                    .await?;
                    let user = tx
                        .decrement::<User>(USERS_TABLE, id, BALANCE_COLUMN, value)
                        .await?;

                    match user {
                        Some(user) if user.balance < Decimal::ZERO => {
                            Err(DbError::Aborted(NEGATIVE_BALANCE.to_string()))
                        }
                        user => Ok(user),
                    }
                })
            })
            .await;

        match result {
            Ok(Some(user)) => {
                info!(user_id = %user.id, %value, balance = %user.balance, "Purchase completed");
                Ok(Some(user))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                warn!(user_id = %id, %value, error = %err, "Purchase rejected");
                Err(err.into())
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
