//! Per-account read cache and display feedback.
//!
//! A [`LedgerClient`] is a view of the ledger for one account. It keeps an [`AccountSnapshot`]
//! (balance, active rewards, redeemed rewards) in a shared [`SnapshotCache`] so repeated reads
//! don't hit the store. The snapshot is never the authority for a balance: every mutation made
//! through the client goes to the store first, then drops and re-reads the snapshot.

use moka::future::Cache;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::{
    config::ClientCacheConfig,
    db::models::{
        balances::{BonusGrantDBResponse, CoinBalanceDBResponse},
        rewards::RewardDBResponse,
        user_rewards::{RedemptionDBResponse, UserRewardDBResponse, UserRewardWithRewardDBResponse},
    },
    ledger::{LedgerError, Result},
    services::Ledger,
    types::{AccountId, RequestId, RewardId, UserRewardId, abbrev_uuid},
};

/// Everything an account's storefront view shows about coins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub balance: CoinBalanceDBResponse,
    pub rewards: Vec<RewardDBResponse>,
    pub my_rewards: Vec<UserRewardWithRewardDBResponse>,
}

/// Snapshot cache shared by all clients
#[derive(Clone)]
pub struct SnapshotCache {
    cache: Cache<AccountId, Arc<AccountSnapshot>>,
}

impl SnapshotCache {
    pub fn new(config: &ClientCacheConfig) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(config.max_capacity)
                .time_to_live(config.ttl)
                .build(),
        }
    }

    /// Drop an account's snapshot after a change made outside a [`LedgerClient`]
    pub async fn invalidate(&self, account_id: AccountId) {
        self.cache.invalidate(&account_id).await;
    }
}

/// One redemption attempt. Retrying the same attempt reuses its request id, so a retry after a
/// lost response can't debit twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemAttempt {
    pub reward_id: RewardId,
    pub request_id: RequestId,
}

impl RedeemAttempt {
    pub fn new(reward_id: RewardId) -> Self {
        Self {
            reward_id,
            request_id: RequestId::generate(),
        }
    }

    pub fn with_request_id(reward_id: RewardId, request_id: RequestId) -> Self {
        Self { reward_id, request_id }
    }
}

/// Display-ready outcome of a redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemFeedback {
    pub success: bool,
    pub message: String,
    pub new_balance: Option<i64>,
    /// The same attempt may be submitted again
    pub retryable: bool,
}

impl RedeemFeedback {
    pub fn from_result(result: &Result<RedemptionDBResponse>) -> Self {
        match result {
            Ok(redemption) => Self {
                success: true,
                message: format!("Reward redeemed! You have {} coins left.", redemption.new_balance),
                new_balance: Some(redemption.new_balance),
                retryable: false,
            },
            Err(e) => Self {
                success: false,
                message: failure_message(e),
                new_balance: None,
                retryable: e.is_transient(),
            },
        }
    }
}

/// User-facing wording for a failed ledger operation
pub fn failure_message(err: &LedgerError) -> String {
    match err {
        LedgerError::InsufficientBalance { .. } => match err.shortfall() {
            Some(shortfall) => format!("You need {shortfall} more coins to redeem this reward."),
            None => "Not enough coins to redeem this reward.".to_string(),
        },
        LedgerError::RewardUnavailable { .. } => "This reward is no longer available.".to_string(),
        LedgerError::Conflict { .. } | LedgerError::StoreUnavailable(_) => {
            "Something went wrong on our side. Please try again.".to_string()
        }
        LedgerError::NotAuthenticated => "Please sign in to continue.".to_string(),
        LedgerError::AccountNotFound { .. } => "No coin account exists for this user.".to_string(),
        LedgerError::UserRewardNotFound { .. } => "Redeemed reward not found.".to_string(),
        LedgerError::RewardAlreadyUsed { .. } => "This reward has already been used.".to_string(),
        LedgerError::RewardExpired { .. } => "This reward has expired.".to_string(),
        LedgerError::InvalidRequest { message } => message.clone(),
        LedgerError::Internal(_) => "Internal server error".to_string(),
    }
}

pub struct LedgerClient {
    ledger: Ledger,
    cache: SnapshotCache,
    account_id: AccountId,
}

impl LedgerClient {
    pub fn new(ledger: Ledger, cache: SnapshotCache, account_id: AccountId) -> Self {
        Self {
            ledger,
            cache,
            account_id,
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// Cached snapshot, read from the store on a miss
    pub async fn snapshot(&self) -> Result<Arc<AccountSnapshot>> {
        if let Some(cached) = self.cache.cache.get(&self.account_id).await {
            debug!("Cache hit for account snapshot");
            return Ok(cached);
        }

        debug!("Cache miss for account snapshot, reading from store");
        let snapshot = Arc::new(self.fetch().await?);
        self.cache.cache.insert(self.account_id, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Drop the cached snapshot and read a fresh one
    pub async fn refresh(&self) -> Result<Arc<AccountSnapshot>> {
        self.invalidate().await;
        self.snapshot().await
    }

    async fn fetch(&self) -> Result<AccountSnapshot> {
        let balance = self.ledger.accounts.get_balance(self.account_id).await?;
        let rewards = self.ledger.catalog.list_active_rewards().await?;
        let my_rewards = self.ledger.redemptions.my_rewards(self.account_id).await?;
        Ok(AccountSnapshot {
            balance,
            rewards,
            my_rewards,
        })
    }

    async fn invalidate(&self) {
        self.cache.invalidate(self.account_id).await;
    }

    pub async fn grant_first_login_bonus(&self) -> Result<BonusGrantDBResponse> {
        let grant = self.ledger.accounts.grant_first_login_bonus(self.account_id).await;
        self.invalidate().await;
        grant
    }

    #[instrument(skip_all, fields(account_id = %abbrev_uuid(&self.account_id), request_id = %attempt.request_id))]
    pub async fn redeem_reward(&self, attempt: &RedeemAttempt) -> Result<RedemptionDBResponse> {
        let result = self
            .ledger
            .redemptions
            .redeem(self.account_id, attempt.reward_id, Some(attempt.request_id.clone()))
            .await;
        // Invalidate on failure too: a timed-out commit may still have landed
        self.invalidate().await;
        result
    }

    /// Redeem and describe the outcome for display
    pub async fn redeem_with_feedback(&self, attempt: &RedeemAttempt) -> RedeemFeedback {
        RedeemFeedback::from_result(&self.redeem_reward(attempt).await)
    }

    pub async fn use_reward(&self, user_reward_id: UserRewardId) -> Result<UserRewardDBResponse> {
        let used = self.ledger.redemptions.use_reward(self.account_id, user_reward_id).await;
        self.invalidate().await;
        used
    }
}
