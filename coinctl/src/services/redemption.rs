//! Redemption engine.
//!
//! A redemption attempt moves through `Requested -> Authorized -> Committed`, or ends in
//! `Rejected`. Authorization only checks the catalog; the balance check and the debit happen
//! inside the store's atomic [`LedgerStore::commit_redemption`], so no decision is ever made on a
//! balance read outside the commit.
//!
//! A commit that loses a race surfaces as [`LedgerError::Conflict`] with nothing written, and is
//! retried here with linear backoff. Every other failure is returned to the caller as-is.

use chrono::{DateTime, TimeDelta, Utc};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

use super::catalog::RewardCatalog;
use crate::{
    config::LedgerConfig,
    db::models::user_rewards::{RedemptionCommitDBRequest, RedemptionDBResponse, UserRewardDBResponse, UserRewardWithRewardDBResponse},
    ledger::{LedgerError, LedgerStore, Result},
    types::{AccountId, RequestId, RewardId, UserRewardId, abbrev_uuid},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionState {
    Requested,
    Authorized,
    Committed,
    Rejected,
}

impl fmt::Display for RedemptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RedemptionState::Requested => "requested",
            RedemptionState::Authorized => "authorized",
            RedemptionState::Committed => "committed",
            RedemptionState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct RedemptionEngine {
    store: Arc<dyn LedgerStore>,
    catalog: RewardCatalog,
    validity: Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl RedemptionEngine {
    pub fn new(store: Arc<dyn LedgerStore>, catalog: RewardCatalog, config: &LedgerConfig) -> Self {
        Self {
            store,
            catalog,
            validity: config.redemption_validity,
            max_attempts: config.max_conflict_retries.max(1),
            backoff: config.conflict_backoff,
        }
    }

    fn expiry_after(&self, redeemed_at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        TimeDelta::from_std(self.validity)
            .ok()
            .and_then(|validity| redeemed_at.checked_add_signed(validity))
            .ok_or_else(|| LedgerError::Internal(anyhow::anyhow!("Redemption validity {:?} is out of range", self.validity)))
    }

    /// Exchange coins for a reward.
    ///
    /// With a `request_id`, repeating a call that already committed returns the earlier result
    /// (`replayed = true`) instead of debiting again.
    #[instrument(
        skip(self, request_id),
        fields(account_id = %abbrev_uuid(&account_id), reward_id = %abbrev_uuid(&reward_id), state = tracing::field::Empty),
        err
    )]
    pub async fn redeem(&self, account_id: AccountId, reward_id: RewardId, request_id: Option<RequestId>) -> Result<RedemptionDBResponse> {
        let span = tracing::Span::current();
        span.record("state", tracing::field::display(RedemptionState::Requested));

        let reward = match self.catalog.get_active_reward(reward_id).await {
            Ok(reward) => reward,
            Err(e) => {
                span.record("state", tracing::field::display(RedemptionState::Rejected));
                return Err(e);
            }
        };
        span.record("state", tracing::field::display(RedemptionState::Authorized));

        let redeemed_at = Utc::now();
        let expiry_date = if reward.kind.expires() {
            match self.expiry_after(redeemed_at) {
                Ok(expiry) => Some(expiry),
                Err(e) => {
                    span.record("state", tracing::field::display(RedemptionState::Rejected));
                    return Err(e);
                }
            }
        } else {
            None
        };

        let commit = RedemptionCommitDBRequest {
            account_id,
            reward_id,
            cost: reward.cost,
            description: reward.name.clone(),
            request_id,
            redeemed_at,
            expiry_date,
        };

        match self.commit_with_retry(&commit).await {
            Ok(redemption) => {
                span.record("state", tracing::field::display(RedemptionState::Committed));
                if redemption.replayed {
                    info!(new_balance = redemption.new_balance, "Replayed earlier redemption");
                } else {
                    info!(cost = reward.cost, new_balance = redemption.new_balance, "Redeemed reward");
                }
                Ok(redemption)
            }
            Err(e) => {
                span.record("state", tracing::field::display(RedemptionState::Rejected));
                Err(e)
            }
        }
    }

    async fn commit_with_retry(&self, commit: &RedemptionCommitDBRequest) -> Result<RedemptionDBResponse> {
        let mut attempt = 1;
        loop {
            match self.store.commit_redemption(commit).await {
                Err(LedgerError::Conflict { .. }) if attempt < self.max_attempts => {
                    let delay = self.backoff * attempt;
                    debug!(attempt, ?delay, "Redemption commit conflicted, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(LedgerError::Conflict { .. }) => {
                    warn!(attempts = attempt, "Redemption commit kept conflicting, giving up");
                    return Err(LedgerError::Conflict { attempts: attempt });
                }
                other => return other,
            }
        }
    }

    /// Redemptions for an account with their rewards, newest first
    pub async fn my_rewards(&self, account_id: AccountId) -> Result<Vec<UserRewardWithRewardDBResponse>> {
        self.store.list_user_rewards(account_id).await
    }

    /// Consume a redeemed reward. A reward can be used once, and never after it expires.
    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&account_id), user_reward_id = %abbrev_uuid(&user_reward_id)), err)]
    pub async fn use_reward(&self, account_id: AccountId, user_reward_id: UserRewardId) -> Result<UserRewardDBResponse> {
        let used = self.store.mark_reward_used(account_id, user_reward_id, Utc::now()).await?;
        info!("Marked reward as used");
        Ok(used)
    }
}
