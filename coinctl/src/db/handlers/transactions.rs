//! Database repository for the coin transaction log.

use crate::db::{
    errors::Result,
    models::transactions::{CoinTransactionCreateDBRequest, CoinTransactionDBResponse, CoinTransactionFilter},
};
use crate::types::AccountId;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

pub struct Transactions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Transactions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Append a transaction row. Must run in the same database transaction as the balance
    /// update it records.
    pub async fn append(
        &mut self,
        request: &CoinTransactionCreateDBRequest,
        balance_after: i64,
        created_at: DateTime<Utc>,
    ) -> Result<CoinTransactionDBResponse> {
        let transaction = sqlx::query_as::<_, CoinTransactionDBResponse>(
            r#"
            INSERT INTO coin_transactions (id, account_id, amount, balance_after, transaction_type, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, account_id, amount, balance_after, transaction_type, description, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.account_id)
        .bind(request.amount)
        .bind(balance_after)
        .bind(request.transaction_type)
        .bind(&request.description)
        .bind(created_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(transaction)
    }

    pub async fn get(&mut self, id: Uuid) -> Result<Option<CoinTransactionDBResponse>> {
        let transaction = sqlx::query_as::<_, CoinTransactionDBResponse>(
            r#"
            SELECT id, account_id, amount, balance_after, transaction_type, description, created_at
            FROM coin_transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(transaction)
    }

    /// List transactions for an account, newest first
    pub async fn list(&mut self, filter: &CoinTransactionFilter) -> Result<Vec<CoinTransactionDBResponse>> {
        let transactions = sqlx::query_as::<_, CoinTransactionDBResponse>(
            r#"
            SELECT id, account_id, amount, balance_after, transaction_type, description, created_at
            FROM coin_transactions
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(filter.account_id)
        .bind(filter.skip)
        .bind(filter.limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(transactions)
    }

    /// Sum of all transaction amounts for an account
    pub async fn sum(&mut self, account_id: AccountId) -> Result<i64> {
        let sum = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT
            FROM coin_transactions
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(sum)
    }
}
