//! Database repository for redeemed rewards.

use crate::db::{
    errors::Result,
    models::{
        rewards::{RewardDBResponse, RewardRow},
        user_rewards::{RedemptionCommitDBRequest, UserRewardDBResponse, UserRewardWithRewardDBResponse},
    },
};
use crate::types::{AccountId, RequestId, RewardId, TransactionId, UserRewardId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

// Database entity model for a user_rewards row
#[derive(Debug, Clone, FromRow)]
struct UserReward {
    pub id: UserRewardId,
    pub account_id: AccountId,
    pub reward_id: RewardId,
    pub transaction_id: TransactionId,
    pub request_id: Option<String>,
    pub redeemed_at: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl From<UserReward> for UserRewardDBResponse {
    fn from(row: UserReward) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            reward_id: row.reward_id,
            transaction_id: row.transaction_id,
            request_id: row.request_id.as_deref().and_then(RequestId::parse),
            redeemed_at: row.redeemed_at,
            expiry_date: row.expiry_date,
            is_used: row.is_used,
            used_at: row.used_at,
        }
    }
}

// Joined row: user reward columns followed by reward columns prefixed with `r_`
#[derive(Debug, Clone, FromRow)]
struct UserRewardJoined {
    #[sqlx(flatten)]
    pub user_reward: UserReward,
    pub r_id: RewardId,
    pub r_name: String,
    pub r_description: Option<String>,
    pub r_cost: i64,
    pub r_image_url: Option<String>,
    pub r_reward_type: String,
    pub r_discount_percentage: Option<i32>,
    pub r_product_id: Option<i64>,
    pub r_is_active: bool,
    pub r_created_at: DateTime<Utc>,
    pub r_updated_at: DateTime<Utc>,
}

impl TryFrom<UserRewardJoined> for UserRewardWithRewardDBResponse {
    type Error = crate::db::errors::DbError;

    fn try_from(row: UserRewardJoined) -> std::result::Result<Self, Self::Error> {
        let reward = RewardDBResponse::try_from(RewardRow {
            id: row.r_id,
            name: row.r_name,
            description: row.r_description,
            cost: row.r_cost,
            image_url: row.r_image_url,
            reward_type: row.r_reward_type,
            discount_percentage: row.r_discount_percentage,
            product_id: row.r_product_id,
            is_active: row.r_is_active,
            created_at: row.r_created_at,
            updated_at: row.r_updated_at,
        })?;

        Ok(Self {
            user_reward: row.user_reward.into(),
            reward,
        })
    }
}

const USER_REWARD_COLUMNS: &str = "id, account_id, reward_id, transaction_id, request_id, redeemed_at, expiry_date, is_used, used_at";

pub struct UserRewards<'c> {
    db: &'c mut PgConnection,
}

impl<'c> UserRewards<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    pub async fn insert(&mut self, request: &RedemptionCommitDBRequest, transaction_id: TransactionId) -> Result<UserRewardDBResponse> {
        let row = sqlx::query_as::<_, UserReward>(&format!(
            r#"
            INSERT INTO user_rewards (id, account_id, reward_id, transaction_id, request_id, redeemed_at, expiry_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_REWARD_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(request.account_id)
        .bind(request.reward_id)
        .bind(transaction_id)
        .bind(request.request_id.as_ref().map(RequestId::as_str))
        .bind(request.redeemed_at)
        .bind(request.expiry_date)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row.into())
    }

    pub async fn get(&mut self, account_id: AccountId, id: UserRewardId) -> Result<Option<UserRewardDBResponse>> {
        let row = sqlx::query_as::<_, UserReward>(&format!(
            "SELECT {USER_REWARD_COLUMNS} FROM user_rewards WHERE account_id = $1 AND id = $2"
        ))
        .bind(account_id)
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn find_by_request_id(&mut self, account_id: AccountId, request_id: &RequestId) -> Result<Option<UserRewardDBResponse>> {
        let row = sqlx::query_as::<_, UserReward>(&format!(
            "SELECT {USER_REWARD_COLUMNS} FROM user_rewards WHERE account_id = $1 AND request_id = $2"
        ))
        .bind(account_id)
        .bind(request_id.as_str())
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    /// All redemptions for an account joined with their rewards, newest first
    pub async fn list_with_rewards(&mut self, account_id: AccountId) -> Result<Vec<UserRewardWithRewardDBResponse>> {
        let rows = sqlx::query_as::<_, UserRewardJoined>(
            r#"
            SELECT ur.id, ur.account_id, ur.reward_id, ur.transaction_id, ur.request_id,
                   ur.redeemed_at, ur.expiry_date, ur.is_used, ur.used_at,
                   r.id AS r_id, r.name AS r_name, r.description AS r_description, r.cost AS r_cost,
                   r.image_url AS r_image_url, r.reward_type AS r_reward_type,
                   r.discount_percentage AS r_discount_percentage, r.product_id AS r_product_id,
                   r.is_active AS r_is_active, r.created_at AS r_created_at, r.updated_at AS r_updated_at
            FROM user_rewards ur
            JOIN rewards r ON r.id = ur.reward_id
            WHERE ur.account_id = $1
            ORDER BY ur.redeemed_at DESC, ur.id DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&mut *self.db)
        .await?;

        rows.into_iter().map(UserRewardWithRewardDBResponse::try_from).collect()
    }

    /// Flip `is_used` to true if it is still false and the reward hasn't expired.
    ///
    /// Returns `None` when the guard rejected the update; callers re-read the row to report why.
    pub async fn mark_used(&mut self, account_id: AccountId, id: UserRewardId, now: DateTime<Utc>) -> Result<Option<UserRewardDBResponse>> {
        let row = sqlx::query_as::<_, UserReward>(&format!(
            r#"
            UPDATE user_rewards
            SET is_used = TRUE, used_at = $3
            WHERE account_id = $1
              AND id = $2
              AND NOT is_used
              AND (expiry_date IS NULL OR expiry_date > $3)
            RETURNING {USER_REWARD_COLUMNS}
            "#
        ))
        .bind(account_id)
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row.map(Into::into))
    }
}
