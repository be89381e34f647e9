//! Database models for redeemed rewards.

use crate::db::models::rewards::RewardDBResponse;
use crate::types::{AccountId, RequestId, RewardId, TransactionId, UserRewardId};
use chrono::{DateTime, Utc};

/// Database request for committing a redemption as one atomic unit
///
/// The store debits `cost`, appends a `redemption` transaction described by `description`,
/// and inserts the user reward row, or does none of these.
#[derive(Debug, Clone)]
pub struct RedemptionCommitDBRequest {
    pub account_id: AccountId,
    pub reward_id: RewardId,
    pub cost: i64,
    pub description: String,
    pub request_id: Option<RequestId>,
    pub redeemed_at: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
}

/// Database response for a user reward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRewardDBResponse {
    pub id: UserRewardId,
    pub account_id: AccountId,
    pub reward_id: RewardId,
    pub transaction_id: TransactionId,
    pub request_id: Option<RequestId>,
    pub redeemed_at: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl UserRewardDBResponse {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= now)
    }
}

/// A user reward joined with the catalog entry it was redeemed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRewardWithRewardDBResponse {
    pub user_reward: UserRewardDBResponse,
    pub reward: RewardDBResponse,
}

/// Result of a committed (or replayed) redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionDBResponse {
    pub user_reward: UserRewardDBResponse,
    pub new_balance: i64,
    /// True when the request id matched an earlier commit and nothing was written
    pub replayed: bool,
}
