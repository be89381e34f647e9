//! Ledger store abstraction layer
//!
//! This module defines the [`LedgerStore`] trait: the durable record of balances, the
//! transaction log and redeemed rewards, reached through a small set of atomic operations.
//! Every mutating operation is a single unit against the store; there is no way to debit a
//! balance without appending its transaction, or to insert a redemption without its debit.
//!
//! Two backends are provided:
//!
//! - [`postgres::PostgresLedger`]: SQLx over PostgreSQL, one SQL transaction per operation with
//!   guarded `UPDATE ... WHERE balance + delta >= 0` statements as the serialization point.
//! - [`memory::InMemoryLedger`]: `DashMap` keyed by account, where each account's entry lock is
//!   the serialization point. Used for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    config::DatabaseConfig,
    db::{
        errors::DbError,
        models::{
            balances::{BalanceAuditDBResponse, BonusGrantDBResponse, CoinBalanceDBResponse},
            rewards::{RewardCreateDBRequest, RewardDBResponse},
            transactions::{CoinTransactionCreateDBRequest, CoinTransactionDBResponse, CoinTransactionFilter},
            user_rewards::{RedemptionCommitDBRequest, RedemptionDBResponse, UserRewardDBResponse, UserRewardWithRewardDBResponse},
        },
    },
    types::{AccountId, RewardId, UserRewardId},
};

pub mod memory;
pub mod postgres;

/// Create a ledger store from configuration
///
/// The Postgres pool must already be connected and migrated when `database` is external.
pub fn create_store(database: &DatabaseConfig, pool: Option<sqlx::PgPool>) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match (database, pool) {
        (DatabaseConfig::Memory, _) => Ok(Arc::new(memory::InMemoryLedger::new())),
        (DatabaseConfig::External { .. }, Some(pool)) => Ok(Arc::new(postgres::PostgresLedger::new(pool))),
        (DatabaseConfig::External { .. }, None) => Err(anyhow::anyhow!("External database configured but no pool was provided")),
    }
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur while reading or mutating the ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Account {account_id} has no coin balance")]
    AccountNotFound { account_id: AccountId },

    #[error("Reward {reward_id} is no longer available")]
    RewardUnavailable { reward_id: RewardId },

    #[error("Insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("Concurrent update conflict after {attempts} attempt(s)")]
    Conflict { attempts: u32 },

    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Redeemed reward {user_reward_id} not found")]
    UserRewardNotFound { user_reward_id: UserRewardId },

    #[error("Redeemed reward {user_reward_id} has already been used")]
    RewardAlreadyUsed { user_reward_id: UserRewardId },

    #[error("Redeemed reward {user_reward_id} has expired")]
    RewardExpired { user_reward_id: UserRewardId },

    #[error("{message}")]
    InvalidRequest { message: String },

    #[error(transparent)]
    Internal(anyhow::Error),
}

impl LedgerError {
    /// Coins missing for an insufficient-balance rejection
    pub fn shortfall(&self) -> Option<i64> {
        match self {
            LedgerError::InsufficientBalance { balance, required } => Some(required - balance),
            _ => None,
        }
    }

    /// Transient failures may be retried by the caller; everything else is terminal
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Conflict { .. } | LedgerError::StoreUnavailable(_))
    }
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::SerializationFailure { .. } => LedgerError::Conflict { attempts: 1 },
            DbError::Unavailable(message) => LedgerError::StoreUnavailable(message),
            other => LedgerError::Internal(anyhow::Error::from(other)),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

/// The ledger store RPC surface
///
/// Implementors must execute each mutating method as one atomic unit and serialize mutations
/// per account. No method may leave a balance negative, and every balance change must be paired
/// with exactly one appended transaction.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create the balance row for an account if absent. Idempotent.
    async fn provision_account(&self, account_id: AccountId) -> Result<CoinBalanceDBResponse>;

    /// Read the current balance row
    async fn read_balance(&self, account_id: AccountId) -> Result<Option<CoinBalanceDBResponse>>;

    /// Credit `amount` and set the first-login flag, only if the flag is unset.
    ///
    /// Returns `granted = false` with the unchanged balance when the bonus was already granted.
    async fn grant_bonus(&self, account_id: AccountId, amount: i64) -> Result<BonusGrantDBResponse>;

    /// Apply a signed delta and append its transaction, only if the balance stays non-negative.
    ///
    /// Fails with [`LedgerError::InsufficientBalance`] otherwise, leaving nothing written.
    async fn apply_delta(&self, request: &CoinTransactionCreateDBRequest) -> Result<CoinTransactionDBResponse>;

    /// Debit, append the redemption transaction and insert the user reward as one unit.
    ///
    /// When the request carries a request id already committed for this account, nothing is
    /// written and the earlier result is returned with `replayed = true`.
    async fn commit_redemption(&self, request: &RedemptionCommitDBRequest) -> Result<RedemptionDBResponse>;

    /// Transition a redeemed reward to used. Never un-sets.
    async fn mark_reward_used(&self, account_id: AccountId, user_reward_id: UserRewardId, now: DateTime<Utc>) -> Result<UserRewardDBResponse>;

    async fn get_reward(&self, reward_id: RewardId) -> Result<Option<RewardDBResponse>>;

    /// Active rewards ordered by ascending cost
    async fn list_active_rewards(&self) -> Result<Vec<RewardDBResponse>>;

    async fn create_reward(&self, request: &RewardCreateDBRequest) -> Result<RewardDBResponse>;

    async fn set_reward_active(&self, reward_id: RewardId, is_active: bool) -> Result<Option<RewardDBResponse>>;

    /// Redemptions for an account joined with their rewards, newest first
    async fn list_user_rewards(&self, account_id: AccountId) -> Result<Vec<UserRewardWithRewardDBResponse>>;

    /// Transactions for an account, newest first
    async fn list_transactions(&self, filter: &CoinTransactionFilter) -> Result<Vec<CoinTransactionDBResponse>>;

    /// Sum of all transaction amounts for an account
    async fn transaction_sum(&self, account_id: AccountId) -> Result<i64>;

    /// Balance and transaction sum from one consistent read, `None` for an unknown account
    async fn audit_balance(&self, account_id: AccountId) -> Result<Option<BalanceAuditDBResponse>>;

    async fn list_account_ids(&self) -> Result<Vec<AccountId>>;
}
