//! In-memory ledger store
//!
//! Accounts live in a [`DashMap`]; every mutation runs while holding that account's entry
//! guard, which makes the guard the per-account serialization point. Operations on different
//! accounts never contend beyond the map's sharding.
//!
//! Nothing survives a restart, so this backend is meant for development and tests. It can be
//! switched to unavailable, and can fail a number of upcoming redemption commits with
//! `Conflict`, to exercise the callers' retry paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;
use uuid::Uuid;

use super::{LedgerError, LedgerStore, Result};
use crate::{
    db::models::{
        balances::{BalanceAuditDBResponse, BonusGrantDBResponse, CoinBalanceDBResponse},
        rewards::{RewardCreateDBRequest, RewardDBResponse},
        transactions::{CoinTransactionCreateDBRequest, CoinTransactionDBResponse, CoinTransactionFilter, CoinTransactionType},
        user_rewards::{RedemptionCommitDBRequest, RedemptionDBResponse, UserRewardDBResponse, UserRewardWithRewardDBResponse},
    },
    types::{AccountId, RewardId, UserRewardId, abbrev_uuid},
};

#[derive(Debug, Clone)]
struct AccountLedger {
    balance: CoinBalanceDBResponse,
    /// Oldest first
    transactions: Vec<CoinTransactionDBResponse>,
    /// Oldest first
    user_rewards: Vec<UserRewardDBResponse>,
}

impl AccountLedger {
    fn new(account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            balance: CoinBalanceDBResponse::provisioned(account_id, now),
            transactions: Vec::new(),
            user_rewards: Vec::new(),
        }
    }

    /// Apply a delta and append its transaction, or change nothing
    fn apply(&mut self, request: &CoinTransactionCreateDBRequest, now: DateTime<Utc>) -> Result<CoinTransactionDBResponse> {
        let current = self.balance.balance;
        let new_balance = current.checked_add(request.amount).ok_or_else(|| LedgerError::InvalidRequest {
            message: format!("Adjustment of {} overflows the balance", request.amount),
        })?;

        if new_balance < 0 {
            return Err(LedgerError::InsufficientBalance {
                balance: current,
                required: -request.amount,
            });
        }

        let transaction = CoinTransactionDBResponse {
            id: Uuid::new_v4(),
            account_id: request.account_id,
            amount: request.amount,
            balance_after: new_balance,
            transaction_type: request.transaction_type,
            description: request.description.clone(),
            created_at: now,
        };

        self.balance.balance = new_balance;
        self.balance.updated_at = now;
        self.transactions.push(transaction.clone());

        Ok(transaction)
    }

    fn replay(&self, request: &RedemptionCommitDBRequest, prior: &UserRewardDBResponse) -> Result<RedemptionDBResponse> {
        if prior.reward_id != request.reward_id {
            return Err(LedgerError::InvalidRequest {
                message: "Idempotency key was already used for a different reward".to_string(),
            });
        }

        let transaction = self
            .transactions
            .iter()
            .find(|t| t.id == prior.transaction_id)
            .ok_or_else(|| LedgerError::Internal(anyhow::anyhow!("Redemption {} has no paired transaction", prior.id)))?;

        Ok(RedemptionDBResponse {
            user_reward: prior.clone(),
            new_balance: transaction.balance_after,
            replayed: true,
        })
    }
}

/// Ledger store held entirely in process memory
#[derive(Debug)]
pub struct InMemoryLedger {
    accounts: DashMap<AccountId, AccountLedger>,
    rewards: DashMap<RewardId, RewardDBResponse>,
    available: AtomicBool,
    pending_conflicts: AtomicU32,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            rewards: DashMap::new(),
            available: AtomicBool::new(true),
            pending_conflicts: AtomicU32::new(0),
        }
    }

    /// Make every subsequent call fail with `StoreUnavailable` until switched back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Fail the next `count` redemption commits with `Conflict`, writing nothing
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::StoreUnavailable("in-memory ledger is switched off".to_string()))
        }
    }

    fn take_injected_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn provision_account(&self, account_id: AccountId) -> Result<CoinBalanceDBResponse> {
        self.ensure_available()?;
        let entry = self
            .accounts
            .entry(account_id)
            .or_insert_with(|| AccountLedger::new(account_id, Utc::now()));
        Ok(entry.balance.clone())
    }

    async fn read_balance(&self, account_id: AccountId) -> Result<Option<CoinBalanceDBResponse>> {
        self.ensure_available()?;
        Ok(self.accounts.get(&account_id).map(|account| account.balance.clone()))
    }

    async fn grant_bonus(&self, account_id: AccountId, amount: i64) -> Result<BonusGrantDBResponse> {
        self.ensure_available()?;
        let mut account = self.accounts.get_mut(&account_id).ok_or(LedgerError::AccountNotFound { account_id })?;

        if account.balance.has_received_first_login_bonus {
            return Ok(BonusGrantDBResponse {
                granted: false,
                new_balance: account.balance.balance,
            });
        }

        let credit = CoinTransactionCreateDBRequest {
            account_id,
            transaction_type: CoinTransactionType::Bonus,
            amount,
            description: Some("First login bonus".to_string()),
        };
        let transaction = account.apply(&credit, Utc::now())?;
        account.balance.has_received_first_login_bonus = true;

        Ok(BonusGrantDBResponse {
            granted: true,
            new_balance: transaction.balance_after,
        })
    }

    async fn apply_delta(&self, request: &CoinTransactionCreateDBRequest) -> Result<CoinTransactionDBResponse> {
        self.ensure_available()?;
        let mut account = self
            .accounts
            .get_mut(&request.account_id)
            .ok_or(LedgerError::AccountNotFound {
                account_id: request.account_id,
            })?;
        account.apply(request, Utc::now())
    }

    async fn commit_redemption(&self, request: &RedemptionCommitDBRequest) -> Result<RedemptionDBResponse> {
        self.ensure_available()?;
        if self.take_injected_conflict() {
            debug!("Injected conflict for account {}", abbrev_uuid(&request.account_id));
            return Err(LedgerError::Conflict { attempts: 1 });
        }

        let mut account = self
            .accounts
            .get_mut(&request.account_id)
            .ok_or(LedgerError::AccountNotFound {
                account_id: request.account_id,
            })?;

        if let Some(request_id) = &request.request_id
            && let Some(prior) = account.user_rewards.iter().find(|r| r.request_id.as_ref() == Some(request_id))
        {
            return account.replay(request, prior);
        }

        let debit = CoinTransactionCreateDBRequest {
            account_id: request.account_id,
            transaction_type: CoinTransactionType::Redemption,
            amount: -request.cost,
            description: Some(request.description.clone()),
        };
        let transaction = account.apply(&debit, request.redeemed_at)?;

        let user_reward = UserRewardDBResponse {
            id: Uuid::new_v4(),
            account_id: request.account_id,
            reward_id: request.reward_id,
            transaction_id: transaction.id,
            request_id: request.request_id.clone(),
            redeemed_at: request.redeemed_at,
            expiry_date: request.expiry_date,
            is_used: false,
            used_at: None,
        };
        account.user_rewards.push(user_reward.clone());

        Ok(RedemptionDBResponse {
            user_reward,
            new_balance: transaction.balance_after,
            replayed: false,
        })
    }

    async fn mark_reward_used(&self, account_id: AccountId, user_reward_id: UserRewardId, now: DateTime<Utc>) -> Result<UserRewardDBResponse> {
        self.ensure_available()?;
        let mut account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::UserRewardNotFound { user_reward_id })?;

        let user_reward = account
            .user_rewards
            .iter_mut()
            .find(|r| r.id == user_reward_id)
            .ok_or(LedgerError::UserRewardNotFound { user_reward_id })?;

        if user_reward.is_used {
            return Err(LedgerError::RewardAlreadyUsed { user_reward_id });
        }
        if user_reward.is_expired(now) {
            return Err(LedgerError::RewardExpired { user_reward_id });
        }

        user_reward.is_used = true;
        user_reward.used_at = Some(now);
        Ok(user_reward.clone())
    }

    async fn get_reward(&self, reward_id: RewardId) -> Result<Option<RewardDBResponse>> {
        self.ensure_available()?;
        Ok(self.rewards.get(&reward_id).map(|r| r.clone()))
    }

    async fn list_active_rewards(&self) -> Result<Vec<RewardDBResponse>> {
        self.ensure_available()?;
        let mut rewards: Vec<RewardDBResponse> = self
            .rewards
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.value().clone())
            .collect();
        rewards.sort_by(|a, b| a.cost.cmp(&b.cost).then_with(|| a.name.cmp(&b.name)));
        Ok(rewards)
    }

    async fn create_reward(&self, request: &RewardCreateDBRequest) -> Result<RewardDBResponse> {
        self.ensure_available()?;
        let now = Utc::now();
        let reward = RewardDBResponse {
            id: Uuid::new_v4(),
            name: request.name.clone(),
            description: request.description.clone(),
            cost: request.cost,
            image_url: request.image_url.clone(),
            kind: request.kind,
            is_active: request.is_active,
            created_at: now,
            updated_at: now,
        };
        self.rewards.insert(reward.id, reward.clone());
        Ok(reward)
    }

    async fn set_reward_active(&self, reward_id: RewardId, is_active: bool) -> Result<Option<RewardDBResponse>> {
        self.ensure_available()?;
        Ok(self.rewards.get_mut(&reward_id).map(|mut reward| {
            reward.is_active = is_active;
            reward.updated_at = Utc::now();
            reward.clone()
        }))
    }

    async fn list_user_rewards(&self, account_id: AccountId) -> Result<Vec<UserRewardWithRewardDBResponse>> {
        self.ensure_available()?;
        let user_rewards = match self.accounts.get(&account_id) {
            Some(account) => account.user_rewards.clone(),
            None => return Ok(Vec::new()),
        };

        let mut joined = user_rewards
            .into_iter()
            .map(|user_reward| {
                let reward = self
                    .rewards
                    .get(&user_reward.reward_id)
                    .map(|r| r.clone())
                    .ok_or_else(|| LedgerError::Internal(anyhow::anyhow!("Reward {} missing from catalog", user_reward.reward_id)))?;
                Ok(UserRewardWithRewardDBResponse { user_reward, reward })
            })
            .collect::<Result<Vec<_>>>()?;

        joined.reverse();
        joined.sort_by(|a, b| b.user_reward.redeemed_at.cmp(&a.user_reward.redeemed_at));
        Ok(joined)
    }

    async fn list_transactions(&self, filter: &CoinTransactionFilter) -> Result<Vec<CoinTransactionDBResponse>> {
        self.ensure_available()?;
        let Some(account) = self.accounts.get(&filter.account_id) else {
            return Ok(Vec::new());
        };

        Ok(account
            .transactions
            .iter()
            .rev()
            .skip(filter.skip.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn transaction_sum(&self, account_id: AccountId) -> Result<i64> {
        self.ensure_available()?;
        Ok(self
            .accounts
            .get(&account_id)
            .map(|account| account.transactions.iter().map(|t| t.amount).sum())
            .unwrap_or(0))
    }

    async fn audit_balance(&self, account_id: AccountId) -> Result<Option<BalanceAuditDBResponse>> {
        self.ensure_available()?;
        Ok(self.accounts.get(&account_id).map(|account| BalanceAuditDBResponse {
            balance: account.balance.balance,
            transaction_sum: account.transactions.iter().map(|t| t.amount).sum(),
        }))
    }

    async fn list_account_ids(&self) -> Result<Vec<AccountId>> {
        self.ensure_available()?;
        let mut ids: Vec<AccountId> = self.accounts.iter().map(|a| *a.key()).collect();
        ids.sort();
        Ok(ids)
    }
}
