//! Database repository for the reward catalog.

use crate::db::{
    errors::Result,
    models::rewards::{RewardCreateDBRequest, RewardDBResponse, RewardRow},
};
use crate::types::RewardId;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const REWARD_COLUMNS: &str = "id, name, description, cost, image_url, reward_type, discount_percentage, product_id, is_active, created_at, updated_at";

pub struct Rewards<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Rewards<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    pub async fn create(&mut self, request: &RewardCreateDBRequest) -> Result<RewardDBResponse> {
        let row = sqlx::query_as::<_, RewardRow>(&format!(
            r#"
            INSERT INTO rewards (id, name, description, cost, image_url, reward_type, discount_percentage, product_id, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {REWARD_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.cost)
        .bind(&request.image_url)
        .bind(request.kind.type_name())
        .bind(request.kind.discount_percentage())
        .bind(request.kind.product_id())
        .bind(request.is_active)
        .fetch_one(&mut *self.db)
        .await?;

        row.try_into()
    }

    pub async fn get_by_id(&mut self, id: RewardId) -> Result<Option<RewardDBResponse>> {
        let row = sqlx::query_as::<_, RewardRow>(&format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        row.map(RewardDBResponse::try_from).transpose()
    }

    /// Active rewards, cheapest first
    pub async fn list_active(&mut self) -> Result<Vec<RewardDBResponse>> {
        let rows = sqlx::query_as::<_, RewardRow>(&format!(
            "SELECT {REWARD_COLUMNS} FROM rewards WHERE is_active ORDER BY cost ASC, name ASC"
        ))
        .fetch_all(&mut *self.db)
        .await?;

        rows.into_iter().map(RewardDBResponse::try_from).collect()
    }

    pub async fn set_active(&mut self, id: RewardId, is_active: bool) -> Result<Option<RewardDBResponse>> {
        let row = sqlx::query_as::<_, RewardRow>(&format!(
            r#"
            UPDATE rewards
            SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {REWARD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(&mut *self.db)
        .await?;

        row.map(RewardDBResponse::try_from).transpose()
    }
}
