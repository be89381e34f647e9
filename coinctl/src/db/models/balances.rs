//! Database models for coin balances.

use crate::types::AccountId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database response for an account's coin balance row
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CoinBalanceDBResponse {
    pub account_id: AccountId,
    pub balance: i64,
    pub has_received_first_login_bonus: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CoinBalanceDBResponse {
    /// A freshly provisioned balance: zero coins, bonus not yet granted
    pub fn provisioned(account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            balance: 0,
            has_received_first_login_bonus: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of a first-login bonus grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BonusGrantDBResponse {
    /// Whether this call credited the bonus. `false` means it had already been granted.
    pub granted: bool,
    pub new_balance: i64,
}

/// An account's balance next to the sum of its transaction log, read together
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct BalanceAuditDBResponse {
    pub balance: i64,
    pub transaction_sum: i64,
}
