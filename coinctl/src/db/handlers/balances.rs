//! Database repository for coin balances.

use crate::db::{
    errors::Result,
    models::balances::{BalanceAuditDBResponse, CoinBalanceDBResponse},
};
use crate::types::{AccountId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Balances<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Balances<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Create the balance row for an account if it doesn't exist yet, and return it
    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&account_id)), err)]
    pub async fn provision(&mut self, account_id: AccountId) -> Result<CoinBalanceDBResponse> {
        sqlx::query(
            r#"
            INSERT INTO coin_balances (account_id)
            VALUES ($1)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(account_id)
        .execute(&mut *self.db)
        .await?;

        let balance = sqlx::query_as::<_, CoinBalanceDBResponse>(
            r#"
            SELECT account_id, balance, has_received_first_login_bonus, created_at, updated_at
            FROM coin_balances
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(balance)
    }

    pub async fn get(&mut self, account_id: AccountId) -> Result<Option<CoinBalanceDBResponse>> {
        let balance = sqlx::query_as::<_, CoinBalanceDBResponse>(
            r#"
            SELECT account_id, balance, has_received_first_login_bonus, created_at, updated_at
            FROM coin_balances
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(balance)
    }

    /// Take the row lock on an account's balance for the rest of the transaction.
    ///
    /// Returns `false` if the account doesn't exist.
    pub async fn lock(&mut self, account_id: AccountId) -> Result<bool> {
        let locked = sqlx::query_scalar::<_, AccountId>("SELECT account_id FROM coin_balances WHERE account_id = $1 FOR UPDATE")
            .bind(account_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(locked.is_some())
    }

    /// Balance and transaction sum read by one statement, so both see the same snapshot
    pub async fn audit(&mut self, account_id: AccountId) -> Result<Option<BalanceAuditDBResponse>> {
        let audit = sqlx::query_as::<_, BalanceAuditDBResponse>(
            r#"
            SELECT b.balance,
                   COALESCE((SELECT SUM(t.amount) FROM coin_transactions t WHERE t.account_id = b.account_id), 0)::BIGINT
                       AS transaction_sum
            FROM coin_balances b
            WHERE b.account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(audit)
    }

    /// Credit the bonus and set the flag in one statement, only if the flag is still unset.
    ///
    /// Returns the new balance, or `None` if the bonus was already granted (or the account
    /// doesn't exist). Concurrent callers serialize on the row lock; the loser re-evaluates the
    /// `WHERE` clause against the committed flag and matches nothing.
    pub async fn credit_first_login_bonus(&mut self, account_id: AccountId, amount: i64) -> Result<Option<i64>> {
        let new_balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE coin_balances
            SET balance = balance + $2,
                has_received_first_login_bonus = TRUE,
                updated_at = NOW()
            WHERE account_id = $1
              AND NOT has_received_first_login_bonus
            RETURNING balance
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(new_balance)
    }

    /// Apply a signed delta only if the result stays non-negative.
    ///
    /// Returns the new balance, or `None` when the guard rejected the update (insufficient
    /// balance or unknown account). Callers distinguish the two with [`Balances::get`].
    pub async fn apply_delta(&mut self, account_id: AccountId, delta: i64) -> Result<Option<i64>> {
        let new_balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE coin_balances
            SET balance = balance + $2,
                updated_at = NOW()
            WHERE account_id = $1
              AND balance + $2 >= 0
            RETURNING balance
            "#,
        )
        .bind(account_id)
        .bind(delta)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(new_balance)
    }

    pub async fn list_account_ids(&mut self) -> Result<Vec<AccountId>> {
        let ids = sqlx::query_scalar::<_, AccountId>("SELECT account_id FROM coin_balances ORDER BY account_id")
            .fetch_all(&mut *self.db)
            .await?;
        Ok(ids)
    }
}
