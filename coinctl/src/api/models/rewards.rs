use crate::client::AccountSnapshot;
use crate::db::models::{
    rewards::{RewardCreateDBRequest, RewardDBResponse, RewardKind},
    user_rewards::{RedemptionDBResponse, UserRewardDBResponse, UserRewardWithRewardDBResponse},
};
use crate::types::{RewardId, TransactionId, UserRewardId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::coins::BalanceResponse;

fn default_active() -> bool {
    true
}

// Request models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RewardCreate {
    pub name: String,
    pub description: Option<String>,
    /// Price in coins
    pub cost: i64,
    pub image_url: Option<String>,
    /// `reward_type` plus its payload: `discount_percentage` for discounts, `product_id` for products
    #[serde(flatten)]
    pub kind: RewardKind,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RewardUpdate {
    pub is_active: bool,
}

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RewardResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: RewardId,
    pub name: String,
    pub description: Option<String>,
    pub cost: i64,
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub kind: RewardKind,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRewardResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserRewardId,
    #[schema(value_type = String, format = "uuid")]
    pub reward_id: RewardId,
    /// The redemption debit in the transaction log
    #[schema(value_type = String, format = "uuid")]
    pub transaction_id: TransactionId,
    /// Idempotency key the redemption was made with
    pub request_id: Option<String>,
    pub redeemed_at: DateTime<Utc>,
    /// Null for rewards that never expire
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

/// A redeemed reward together with the catalog entry it was redeemed from
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MyRewardResponse {
    #[serde(flatten)]
    pub user_reward: UserRewardResponse,
    pub reward: RewardResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RedeemResponse {
    pub user_reward: UserRewardResponse,
    pub new_balance: i64,
    /// True when the idempotency key matched an earlier redemption and nothing new was written
    pub replayed: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountSnapshotResponse {
    pub balance: BalanceResponse,
    pub rewards: Vec<RewardResponse>,
    pub my_rewards: Vec<MyRewardResponse>,
}

// Conversions
impl From<RewardCreate> for RewardCreateDBRequest {
    fn from(api: RewardCreate) -> Self {
        Self {
            name: api.name,
            description: api.description,
            cost: api.cost,
            image_url: api.image_url,
            kind: api.kind,
            is_active: api.is_active,
        }
    }
}

impl From<RewardDBResponse> for RewardResponse {
    fn from(db: RewardDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            description: db.description,
            cost: db.cost,
            image_url: db.image_url,
            kind: db.kind,
            is_active: db.is_active,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl From<UserRewardDBResponse> for UserRewardResponse {
    fn from(db: UserRewardDBResponse) -> Self {
        Self {
            id: db.id,
            reward_id: db.reward_id,
            transaction_id: db.transaction_id,
            request_id: db.request_id.map(|r| r.to_string()),
            redeemed_at: db.redeemed_at,
            expiry_date: db.expiry_date,
            is_used: db.is_used,
            used_at: db.used_at,
        }
    }
}

impl From<UserRewardWithRewardDBResponse> for MyRewardResponse {
    fn from(db: UserRewardWithRewardDBResponse) -> Self {
        Self {
            user_reward: db.user_reward.into(),
            reward: db.reward.into(),
        }
    }
}

impl RedeemResponse {
    pub fn new(db: RedemptionDBResponse, message: String) -> Self {
        Self {
            user_reward: db.user_reward.into(),
            new_balance: db.new_balance,
            replayed: db.replayed,
            message,
        }
    }
}

impl From<&AccountSnapshot> for AccountSnapshotResponse {
    fn from(snapshot: &AccountSnapshot) -> Self {
        Self {
            balance: snapshot.balance.clone().into(),
            rewards: snapshot.rewards.iter().cloned().map(Into::into).collect(),
            my_rewards: snapshot.my_rewards.iter().cloned().map(Into::into).collect(),
        }
    }
}
