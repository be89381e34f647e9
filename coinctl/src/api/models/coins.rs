use crate::db::models::{
    balances::{BonusGrantDBResponse, CoinBalanceDBResponse},
    transactions::{CoinTransactionDBResponse, CoinTransactionType},
};
use crate::services::AccountAudit;
use crate::types::{AccountId, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Default number of transactions returned per page
pub const DEFAULT_TRANSACTION_LIMIT: i64 = 100;

/// Maximum number of transactions that can be requested per page
pub const MAX_TRANSACTION_LIMIT: i64 = 1000;

// Request models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceAdjustmentCreate {
    /// Signed number of coins; positive credits, negative debits
    pub amount: i64,
    /// Transaction type to record (`adjustment` when omitted)
    #[serde(default)]
    pub transaction_type: Option<CoinTransactionType>,
    /// Optional description of the adjustment
    pub description: Option<String>,
}

/// Query parameters for listing transactions
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListTransactionsQuery {
    /// Number of items to skip
    #[param(default = 0, minimum = 0)]
    pub skip: Option<i64>,

    /// Maximum number of items to return
    #[param(default = 100, minimum = 1, maximum = 1000)]
    pub limit: Option<i64>,
}

impl ListTransactionsQuery {
    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_TRANSACTION_LIMIT).clamp(1, MAX_TRANSACTION_LIMIT)
    }
}

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub account_id: AccountId,
    /// Current coin balance
    pub balance: i64,
    pub has_received_first_login_bonus: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FirstLoginBonusResponse {
    /// False when the bonus had already been granted; the balance is then unchanged
    pub granted: bool,
    pub new_balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CoinTransactionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TransactionId,
    #[schema(value_type = String, format = "uuid")]
    pub account_id: AccountId,
    /// Signed amount; positive for credits
    pub amount: i64,
    /// Balance after this transaction
    pub balance_after: i64,
    pub transaction_type: CoinTransactionType,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountAuditResponse {
    #[schema(value_type = String, format = "uuid")]
    pub account_id: AccountId,
    pub balance: i64,
    /// Sum of all transaction amounts for the account
    pub transaction_sum: i64,
    /// Whether the balance equals the transaction sum
    pub consistent: bool,
}

// Conversions
impl From<CoinBalanceDBResponse> for BalanceResponse {
    fn from(db: CoinBalanceDBResponse) -> Self {
        Self {
            account_id: db.account_id,
            balance: db.balance,
            has_received_first_login_bonus: db.has_received_first_login_bonus,
            updated_at: db.updated_at,
        }
    }
}

impl From<BonusGrantDBResponse> for FirstLoginBonusResponse {
    fn from(db: BonusGrantDBResponse) -> Self {
        Self {
            granted: db.granted,
            new_balance: db.new_balance,
        }
    }
}

impl From<CoinTransactionDBResponse> for CoinTransactionResponse {
    fn from(db: CoinTransactionDBResponse) -> Self {
        Self {
            id: db.id,
            account_id: db.account_id,
            amount: db.amount,
            balance_after: db.balance_after,
            transaction_type: db.transaction_type,
            description: db.description,
            created_at: db.created_at,
        }
    }
}

impl From<AccountAudit> for AccountAuditResponse {
    fn from(audit: AccountAudit) -> Self {
        Self {
            account_id: audit.account_id,
            balance: audit.balance,
            transaction_sum: audit.transaction_sum,
            consistent: audit.consistent(),
        }
    }
}
