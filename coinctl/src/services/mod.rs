//! Business logic over a [`LedgerStore`].
//!
//! - [`coins::CoinAccounts`]: provisioning, first-login bonus, balance adjustments
//! - [`catalog::RewardCatalog`]: active reward listing and catalog maintenance
//! - [`redemption::RedemptionEngine`]: coin-for-reward exchange and reward consumption
//! - [`audit::ConsistencyAudit`]: balance versus transaction-sum check
//!
//! [`Ledger`] bundles all four over one store and is what the HTTP layer holds.

use std::sync::Arc;

use crate::{config::LedgerConfig, ledger::LedgerStore};

pub mod audit;
pub mod catalog;
pub mod coins;
pub mod redemption;

pub use audit::{AccountAudit, ConsistencyAudit};
pub use catalog::RewardCatalog;
pub use coins::CoinAccounts;
pub use redemption::{RedemptionEngine, RedemptionState};

#[derive(Clone)]
pub struct Ledger {
    pub accounts: CoinAccounts,
    pub catalog: RewardCatalog,
    pub redemptions: RedemptionEngine,
    pub audit: ConsistencyAudit,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        let catalog = RewardCatalog::new(store.clone());
        Self {
            accounts: CoinAccounts::new(store.clone(), config.first_login_bonus),
            redemptions: RedemptionEngine::new(store.clone(), catalog.clone(), config),
            audit: ConsistencyAudit::new(store),
            catalog,
        }
    }
}
