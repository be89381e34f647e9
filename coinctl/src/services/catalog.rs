//! Reward catalog: the read path used before a redemption, plus admin maintenance.
//!
//! Only active rewards are listed or redeemable. Deactivating a reward hides it without
//! touching rewards already redeemed from it.

use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    db::models::rewards::{RewardCreateDBRequest, RewardDBResponse, RewardKind},
    ledger::{LedgerError, LedgerStore, Result},
    types::{RewardId, abbrev_uuid},
};

/// Read path over the reward catalog, plus the administrative writes that maintain it
#[derive(Clone)]
pub struct RewardCatalog {
    store: Arc<dyn LedgerStore>,
}

impl RewardCatalog {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Active rewards, cheapest first. An empty catalog is a valid answer.
    pub async fn list_active_rewards(&self) -> Result<Vec<RewardDBResponse>> {
        self.store.list_active_rewards().await
    }

    /// Look up a reward that can currently be redeemed
    pub async fn get_active_reward(&self, reward_id: RewardId) -> Result<RewardDBResponse> {
        match self.store.get_reward(reward_id).await? {
            Some(reward) if reward.is_active => Ok(reward),
            _ => Err(LedgerError::RewardUnavailable { reward_id }),
        }
    }

    #[instrument(skip_all, fields(name = %request.name), err)]
    pub async fn create_reward(&self, request: RewardCreateDBRequest) -> Result<RewardDBResponse> {
        validate(&request)?;
        let reward = self.store.create_reward(&request).await?;
        info!(reward_id = %abbrev_uuid(&reward.id), cost = reward.cost, "Created reward");
        Ok(reward)
    }

    pub async fn set_reward_active(&self, reward_id: RewardId, is_active: bool) -> Result<RewardDBResponse> {
        let reward = self
            .store
            .set_reward_active(reward_id, is_active)
            .await?
            .ok_or(LedgerError::RewardUnavailable { reward_id })?;
        info!(reward_id = %abbrev_uuid(&reward_id), is_active, "Updated reward availability");
        Ok(reward)
    }
}

fn validate(request: &RewardCreateDBRequest) -> Result<()> {
    let invalid = |message: &str| {
        Err(LedgerError::InvalidRequest {
            message: message.to_string(),
        })
    };

    if request.name.trim().is_empty() {
        return invalid("Reward name cannot be empty");
    }
    if request.cost <= 0 {
        return invalid("Reward cost must be a positive number of coins");
    }
    match request.kind {
        RewardKind::Discount { discount_percentage } if !(1..=100).contains(&discount_percentage) => {
            invalid("Discount percentage must be between 1 and 100")
        }
        RewardKind::FreeProduct { product_id } if product_id <= 0 => invalid("Product id must be positive"),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;

    fn request(name: &str, cost: i64, kind: RewardKind) -> RewardCreateDBRequest {
        RewardCreateDBRequest {
            name: name.to_string(),
            description: None,
            cost,
            image_url: None,
            kind,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_list_active_rewards_sorted_by_cost() {
        let catalog = RewardCatalog::new(Arc::new(InMemoryLedger::new()));

        assert!(catalog.list_active_rewards().await.unwrap().is_empty());

        catalog
            .create_reward(request("Free tote", 120, RewardKind::FreeProduct { product_id: 7 }))
            .await
            .unwrap();
        catalog
            .create_reward(request("5% off", 20, RewardKind::Discount { discount_percentage: 5 }))
            .await
            .unwrap();
        let hidden = catalog
            .create_reward(request("20% off", 60, RewardKind::Discount { discount_percentage: 20 }))
            .await
            .unwrap();
        catalog.set_reward_active(hidden.id, false).await.unwrap();

        let names: Vec<String> = catalog
            .list_active_rewards()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["5% off", "Free tote"]);
    }

    #[tokio::test]
    async fn test_inactive_or_missing_reward_is_unavailable() {
        let catalog = RewardCatalog::new(Arc::new(InMemoryLedger::new()));
        let reward = catalog
            .create_reward(request("10% off", 30, RewardKind::Discount { discount_percentage: 10 }))
            .await
            .unwrap();

        assert!(catalog.get_active_reward(reward.id).await.is_ok());

        catalog.set_reward_active(reward.id, false).await.unwrap();
        assert!(matches!(
            catalog.get_active_reward(reward.id).await,
            Err(LedgerError::RewardUnavailable { .. })
        ));
        assert!(matches!(
            catalog.get_active_reward(uuid::Uuid::new_v4()).await,
            Err(LedgerError::RewardUnavailable { .. })
        ));
    }

    #[test]
    fn test_validation() {
        assert!(validate(&request("ok", 10, RewardKind::Discount { discount_percentage: 100 })).is_ok());
        assert!(validate(&request("ok", 10, RewardKind::FreeProduct { product_id: 1 })).is_ok());

        assert!(validate(&request(" ", 10, RewardKind::Discount { discount_percentage: 10 })).is_err());
        assert!(validate(&request("free", 0, RewardKind::Discount { discount_percentage: 10 })).is_err());
        assert!(validate(&request("too much", 10, RewardKind::Discount { discount_percentage: 101 })).is_err());
        assert!(validate(&request("nothing", 10, RewardKind::Discount { discount_percentage: 0 })).is_err());
        assert!(validate(&request("bad product", 10, RewardKind::FreeProduct { product_id: 0 })).is_err());
    }
}
