//! Database models for the reward catalog.
//!
//! The `rewards` table stores the reward kind as a flat `reward_type` column plus two nullable
//! payload columns. Rows are converted into [`RewardKind`] on read so a discount without a
//! percentage, or a product reward without a product, can't exist past the repository.

use crate::db::errors::DbError;
use crate::types::{ProductId, RewardId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// What a reward grants once redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "reward_type", rename_all = "snake_case")]
pub enum RewardKind {
    /// Percentage off a future order
    Discount { discount_percentage: i32 },
    /// A catalog product for free
    #[serde(rename = "product")]
    FreeProduct { product_id: ProductId },
}

impl RewardKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            RewardKind::Discount { .. } => "discount",
            RewardKind::FreeProduct { .. } => "product",
        }
    }

    pub fn discount_percentage(&self) -> Option<i32> {
        match self {
            RewardKind::Discount { discount_percentage } => Some(*discount_percentage),
            RewardKind::FreeProduct { .. } => None,
        }
    }

    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            RewardKind::Discount { .. } => None,
            RewardKind::FreeProduct { product_id } => Some(*product_id),
        }
    }

    /// Discounts are time-limited; free products never expire
    pub fn expires(&self) -> bool {
        matches!(self, RewardKind::Discount { .. })
    }
}

/// Database request for creating a reward
#[derive(Debug, Clone)]
pub struct RewardCreateDBRequest {
    pub name: String,
    pub description: Option<String>,
    pub cost: i64,
    pub image_url: Option<String>,
    pub kind: RewardKind,
    pub is_active: bool,
}

/// Database response for a reward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardDBResponse {
    pub id: RewardId,
    pub name: String,
    pub description: Option<String>,
    pub cost: i64,
    pub image_url: Option<String>,
    pub kind: RewardKind,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Database entity model for a reward row
#[derive(Debug, Clone, FromRow)]
pub(crate) struct RewardRow {
    pub id: RewardId,
    pub name: String,
    pub description: Option<String>,
    pub cost: i64,
    pub image_url: Option<String>,
    pub reward_type: String,
    pub discount_percentage: Option<i32>,
    pub product_id: Option<ProductId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RewardRow> for RewardDBResponse {
    type Error = DbError;

    fn try_from(row: RewardRow) -> Result<Self, Self::Error> {
        let kind = match (row.reward_type.as_str(), row.discount_percentage, row.product_id) {
            ("discount", Some(discount_percentage), None) => RewardKind::Discount { discount_percentage },
            ("product", None, Some(product_id)) => RewardKind::FreeProduct { product_id },
            (other, pct, product) => {
                return Err(DbError::Other(anyhow::anyhow!(
                    "Reward {} has inconsistent type payload: type={other}, discount_percentage={pct:?}, product_id={product:?}",
                    row.id
                )));
            }
        };

        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            cost: row.cost,
            image_url: row.image_url,
            kind,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
