//! # Domain Types
//!
//! Row types of the `users` / `transactions` tables and the item types of
//! the pricing API.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      User       │   │   Transaction   │   │     TxType      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  user_id (FK)   │   │  DEPOSIT        │       │
//! │  │  balance        │   │  type           │──►│  BUY            │       │
//! │  │  created_at     │   │  value          │   └─────────────────┘       │
//! │  │  updated_at     │   │  created_at     │                              │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  SkinportItem   │──►│   MarketItem    │   │    Currency     │       │
//! │  │  (upstream)     │   │  (API response) │   │  EUR, USD, ...  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Money
//! Balances and transaction values are `rust_decimal::Decimal`, matching the
//! `DECIMAL(20, 8)` columns. Item prices come from the pricing API as JSON
//! numbers and stay `f64`: they are displayed, never summed into balances.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RecordError, ValidationError};
use crate::value::{FromRecord, Record, SqlValue};

// =============================================================================
// Table Names
// =============================================================================

pub const USERS_TABLE: &str = "users";
pub const TRANSACTIONS_TABLE: &str = "transactions";

// =============================================================================
// User
// =============================================================================

/// A row of the `users` table.
///
/// Serializes in the API's camelCase shape:
/// `{"id": "...", "balance": "10.5", "createdAt": "...", "updatedAt": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRecord for User {
    fn from_record(record: Record) -> Result<Self, RecordError> {
        Ok(User {
            id: record.try_get("id")?,
            balance: record.try_get("balance")?,
            created_at: record.try_get("created_at")?,
            updated_at: record.try_get("updated_at")?,
        })
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Kind of balance movement, stored as the PostgreSQL enum `tx_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    Deposit,
    Buy,
}

impl TxType {
    /// Name of the PostgreSQL enum type.
    pub const PG_TYPE: &'static str = "tx_type";

    pub fn label(self) -> &'static str {
        match self {
            TxType::Deposit => "DEPOSIT",
            TxType::Buy => "BUY",
        }
    }
}

impl From<TxType> for SqlValue {
    fn from(tx_type: TxType) -> Self {
        SqlValue::enumeration(TxType::PG_TYPE, tx_type.label())
    }
}

impl FromStr for TxType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(TxType::Deposit),
            "BUY" => Ok(TxType::Buy),
            _ => Err(ValidationError::NotAllowed {
                field: "type".to_string(),
                allowed: vec!["DEPOSIT".to_string(), "BUY".to_string()],
            }),
        }
    }
}

/// A row of the `transactions` table: one deposit or purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub value: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Fields for inserting a new transaction row. `id` and `created_at`
    /// are filled in by column defaults.
    pub fn new_row(user_id: Uuid, tx_type: TxType, value: Decimal) -> Record {
        Record::new()
            .with("user_id", user_id)
            .with("type", tx_type)
            .with("value", value)
    }
}

impl FromRecord for Transaction {
    fn from_record(record: Record) -> Result<Self, RecordError> {
        let label: String = record.try_get("type")?;
        let tx_type = label
            .parse::<TxType>()
            .map_err(|e| RecordError::InvalidValue {
                column: "type".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Transaction {
            id: record.try_get("id")?,
            user_id: record.try_get("user_id")?,
            tx_type,
            value: record.try_get("value")?,
            created_at: record.try_get("created_at")?,
        })
    }
}

// =============================================================================
// Currency
// =============================================================================

/// Currencies accepted by the pricing API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Aud,
    Brl,
    Cad,
    Chf,
    Cny,
    Czk,
    Dkk,
    #[default]
    Eur,
    Gbp,
    Hrk,
    Nok,
    Pln,
    Rub,
    Sek,
    Try,
    Usd,
}

impl Currency {
    pub const ALL: [Currency; 16] = [
        Currency::Aud,
        Currency::Brl,
        Currency::Cad,
        Currency::Chf,
        Currency::Cny,
        Currency::Czk,
        Currency::Dkk,
        Currency::Eur,
        Currency::Gbp,
        Currency::Hrk,
        Currency::Nok,
        Currency::Pln,
        Currency::Rub,
        Currency::Sek,
        Currency::Try,
        Currency::Usd,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Currency::Aud => "AUD",
            Currency::Brl => "BRL",
            Currency::Cad => "CAD",
            Currency::Chf => "CHF",
            Currency::Cny => "CNY",
            Currency::Czk => "CZK",
            Currency::Dkk => "DKK",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Hrk => "HRK",
            Currency::Nok => "NOK",
            Currency::Pln => "PLN",
            Currency::Rub => "RUB",
            Currency::Sek => "SEK",
            Currency::Try => "TRY",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "currency".to_string(),
                allowed: Currency::ALL.iter().map(|c| c.code().to_string()).collect(),
            })
    }
}

// =============================================================================
// Items
// =============================================================================

/// One entry of the pricing API's `/items` response.
///
/// Also the shape stored in the cache, so it round-trips through JSON
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinportItem {
    pub market_hash_name: String,
    pub currency: Currency,
    pub min_price: Option<f64>,
}

/// An item as returned by `GET /items`: the cheapest tradable and
/// non-tradable offers side by side.
///
/// A price is absent when the item never appeared in that group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketItem {
    pub app_id: u32,
    pub market_name: String,
    pub currency: Currency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
}

// =============================================================================
// Unit Tests
// =============================================================================
