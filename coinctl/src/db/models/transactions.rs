//! Database models for coin transactions.

use crate::types::{AccountId, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Coin transaction type enum stored as TEXT in database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CoinTransactionType {
    /// One-off credit for an account's first login
    Bonus,
    /// Debit for redeeming a reward
    Redemption,
    /// Manual credit or debit by an administrator
    Adjustment,
    /// Coins earned through purchases
    Purchase,
}

/// Database request for appending a transaction and applying its delta
#[derive(Debug, Clone)]
pub struct CoinTransactionCreateDBRequest {
    pub account_id: AccountId,
    pub transaction_type: CoinTransactionType,
    /// Signed delta: positive credits, negative debits
    pub amount: i64,
    pub description: Option<String>,
}

impl CoinTransactionCreateDBRequest {
    pub fn adjustment(account_id: AccountId, amount: i64, description: Option<String>) -> Self {
        Self {
            account_id,
            transaction_type: CoinTransactionType::Adjustment,
            amount,
            description,
        }
    }
}

/// Database response for a coin transaction
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CoinTransactionDBResponse {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub amount: i64,
    /// Balance immediately after this row was applied
    pub balance_after: i64,
    pub transaction_type: CoinTransactionType,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filter for listing an account's coin transactions
#[derive(Debug, Clone)]
pub struct CoinTransactionFilter {
    pub account_id: AccountId,
    pub skip: i64,
    pub limit: i64,
}

impl CoinTransactionFilter {
    pub fn new(account_id: AccountId, skip: i64, limit: i64) -> Self {
        Self { account_id, skip, limit }
    }
}
