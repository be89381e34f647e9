//! PostgreSQL ledger store
//!
//! Each mutating operation opens one SQL transaction, runs the guarded statements through the
//! repositories in [`crate::db::handlers`], and commits. Any early return drops the transaction,
//! which rolls it back.
//!
//! The balance row is the per-account serialization point. Guarded updates of the form
//! `UPDATE ... WHERE balance + $delta >= 0` take the row lock; a concurrent writer waits for it
//! and then re-checks the guard against the committed balance, so two debits can never both pass
//! on the same coins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument, warn};

use super::{LedgerError, LedgerStore, Result};
use crate::{
    db::{
        handlers::{Balances, Rewards, Transactions, UserRewards},
        models::{
            balances::{BalanceAuditDBResponse, BonusGrantDBResponse, CoinBalanceDBResponse},
            rewards::{RewardCreateDBRequest, RewardDBResponse},
            transactions::{CoinTransactionCreateDBRequest, CoinTransactionDBResponse, CoinTransactionFilter, CoinTransactionType},
            user_rewards::{RedemptionCommitDBRequest, RedemptionDBResponse, UserRewardDBResponse, UserRewardWithRewardDBResponse},
        },
    },
    types::{AccountId, RewardId, UserRewardId, abbrev_uuid},
};

const REQUEST_ID_CONSTRAINT: &str = "user_rewards_request_unique";

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explain why a guarded balance update matched no row
    async fn rejection(conn: &mut PgConnection, account_id: AccountId, required: i64) -> Result<LedgerError> {
        Ok(match Balances::new(conn).get(account_id).await? {
            None => LedgerError::AccountNotFound { account_id },
            Some(current) => LedgerError::InsufficientBalance {
                balance: current.balance,
                required,
            },
        })
    }

    /// Rebuild the result of an earlier commit that used the same request id
    async fn replay(conn: &mut PgConnection, request: &RedemptionCommitDBRequest, prior: UserRewardDBResponse) -> Result<RedemptionDBResponse> {
        if prior.reward_id != request.reward_id {
            return Err(LedgerError::InvalidRequest {
                message: "Idempotency key was already used for a different reward".to_string(),
            });
        }

        let transaction = Transactions::new(conn)
            .get(prior.transaction_id)
            .await?
            .ok_or_else(|| LedgerError::Internal(anyhow::anyhow!("Redemption {} has no paired transaction", prior.id)))?;

        debug!(
            "Replaying redemption {} for request id {:?}",
            abbrev_uuid(&prior.id),
            request.request_id.as_ref().map(|r| r.as_str())
        );

        Ok(RedemptionDBResponse {
            user_reward: prior,
            new_balance: transaction.balance_after,
            replayed: true,
        })
    }
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn provision_account(&self, account_id: AccountId) -> Result<CoinBalanceDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Ok(Balances::new(&mut conn).provision(account_id).await?)
    }

    async fn read_balance(&self, account_id: AccountId) -> Result<Option<CoinBalanceDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Balances::new(&mut conn).get(account_id).await?)
    }

    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&account_id)), err)]
    async fn grant_bonus(&self, account_id: AccountId, amount: i64) -> Result<BonusGrantDBResponse> {
        let mut tx = self.pool.begin().await?;

        let Some(new_balance) = Balances::new(&mut tx).credit_first_login_bonus(account_id, amount).await? else {
            let current = Balances::new(&mut tx)
                .get(account_id)
                .await?
                .ok_or(LedgerError::AccountNotFound { account_id })?;
            return Ok(BonusGrantDBResponse {
                granted: false,
                new_balance: current.balance,
            });
        };

        let credit = CoinTransactionCreateDBRequest {
            account_id,
            transaction_type: CoinTransactionType::Bonus,
            amount,
            description: Some("First login bonus".to_string()),
        };
        Transactions::new(&mut tx).append(&credit, new_balance, Utc::now()).await?;

        tx.commit().await?;

        Ok(BonusGrantDBResponse { granted: true, new_balance })
    }

    #[instrument(skip(self, request), fields(account_id = %abbrev_uuid(&request.account_id), amount = request.amount), err)]
    async fn apply_delta(&self, request: &CoinTransactionCreateDBRequest) -> Result<CoinTransactionDBResponse> {
        let mut tx = self.pool.begin().await?;

        let Some(new_balance) = Balances::new(&mut tx).apply_delta(request.account_id, request.amount).await? else {
            return Err(Self::rejection(&mut tx, request.account_id, -request.amount).await?);
        };

        let transaction = Transactions::new(&mut tx).append(request, new_balance, Utc::now()).await?;

        tx.commit().await?;

        Ok(transaction)
    }

    #[instrument(skip(self, request), fields(account_id = %abbrev_uuid(&request.account_id), reward_id = %abbrev_uuid(&request.reward_id)), err)]
    async fn commit_redemption(&self, request: &RedemptionCommitDBRequest) -> Result<RedemptionDBResponse> {
        let mut tx = self.pool.begin().await?;

        // With a request id, lock the balance row before the lookup. A concurrent call with the
        // same id then waits here until the first one commits and finds its user reward.
        let prior = match &request.request_id {
            Some(request_id) => {
                if !Balances::new(&mut tx).lock(request.account_id).await? {
                    return Err(LedgerError::AccountNotFound {
                        account_id: request.account_id,
                    });
                }
                UserRewards::new(&mut tx).find_by_request_id(request.account_id, request_id).await?
            }
            None => None,
        };
        if let Some(prior) = prior {
            return Self::replay(&mut tx, request, prior).await;
        }

        let Some(new_balance) = Balances::new(&mut tx).apply_delta(request.account_id, -request.cost).await? else {
            return Err(Self::rejection(&mut tx, request.account_id, request.cost).await?);
        };

        let debit = CoinTransactionCreateDBRequest {
            account_id: request.account_id,
            transaction_type: CoinTransactionType::Redemption,
            amount: -request.cost,
            description: Some(request.description.clone()),
        };
        let transaction = Transactions::new(&mut tx).append(&debit, new_balance, request.redeemed_at).await?;

        let inserted = UserRewards::new(&mut tx).insert(request, transaction.id).await;
        let user_reward = match inserted {
            Ok(user_reward) => user_reward,
            Err(e) if e.is_constraint(REQUEST_ID_CONSTRAINT) => {
                // A concurrent call with the same request id committed first. Roll back our
                // debit and answer with theirs.
                tx.rollback().await?;
                warn!("Concurrent redemption with the same request id; replaying the committed one");

                let mut conn = self.pool.acquire().await?;
                let request_id = request.request_id.as_ref().ok_or_else(|| {
                    LedgerError::Internal(anyhow::anyhow!("Request id constraint violated without a request id"))
                })?;
                let prior = UserRewards::new(&mut conn)
                    .find_by_request_id(request.account_id, request_id)
                    .await?
                    .ok_or(LedgerError::Conflict { attempts: 1 })?;
                return Self::replay(&mut conn, request, prior).await;
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;

        Ok(RedemptionDBResponse {
            user_reward,
            new_balance,
            replayed: false,
        })
    }

    async fn mark_reward_used(&self, account_id: AccountId, user_reward_id: UserRewardId, now: DateTime<Utc>) -> Result<UserRewardDBResponse> {
        let mut conn = self.pool.acquire().await?;
        let mut repo = UserRewards::new(&mut conn);

        if let Some(updated) = repo.mark_used(account_id, user_reward_id, now).await? {
            return Ok(updated);
        }

        Err(match repo.get(account_id, user_reward_id).await? {
            None => LedgerError::UserRewardNotFound { user_reward_id },
            Some(existing) if existing.is_used => LedgerError::RewardAlreadyUsed { user_reward_id },
            Some(_) => LedgerError::RewardExpired { user_reward_id },
        })
    }

    async fn get_reward(&self, reward_id: RewardId) -> Result<Option<RewardDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Rewards::new(&mut conn).get_by_id(reward_id).await?)
    }

    async fn list_active_rewards(&self) -> Result<Vec<RewardDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Rewards::new(&mut conn).list_active().await?)
    }

    async fn create_reward(&self, request: &RewardCreateDBRequest) -> Result<RewardDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Ok(Rewards::new(&mut conn).create(request).await?)
    }

    async fn set_reward_active(&self, reward_id: RewardId, is_active: bool) -> Result<Option<RewardDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Rewards::new(&mut conn).set_active(reward_id, is_active).await?)
    }

    async fn list_user_rewards(&self, account_id: AccountId) -> Result<Vec<UserRewardWithRewardDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Ok(UserRewards::new(&mut conn).list_with_rewards(account_id).await?)
    }

    async fn list_transactions(&self, filter: &CoinTransactionFilter) -> Result<Vec<CoinTransactionDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Transactions::new(&mut conn).list(filter).await?)
    }

    async fn transaction_sum(&self, account_id: AccountId) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Ok(Transactions::new(&mut conn).sum(account_id).await?)
    }

    async fn audit_balance(&self, account_id: AccountId) -> Result<Option<BalanceAuditDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Balances::new(&mut conn).audit(account_id).await?)
    }

    async fn list_account_ids(&self) -> Result<Vec<AccountId>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Balances::new(&mut conn).list_account_ids().await?)
    }
}
