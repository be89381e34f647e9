//! Coin account service: balance provisioning, the first-login bonus and generic adjustments.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::{
    db::models::{
        balances::{BonusGrantDBResponse, CoinBalanceDBResponse},
        transactions::{CoinTransactionCreateDBRequest, CoinTransactionDBResponse, CoinTransactionFilter, CoinTransactionType},
    },
    ledger::{LedgerError, LedgerStore, Result},
    types::{AccountId, abbrev_uuid},
};

#[derive(Clone)]
pub struct CoinAccounts {
    store: Arc<dyn LedgerStore>,
    first_login_bonus: i64,
}

impl CoinAccounts {
    pub fn new(store: Arc<dyn LedgerStore>, first_login_bonus: i64) -> Self {
        Self { store, first_login_bonus }
    }

    /// Make sure the account has a balance row. Safe to call on every request.
    pub async fn provision(&self, account_id: AccountId) -> Result<CoinBalanceDBResponse> {
        self.store.provision_account(account_id).await
    }

    pub async fn get_balance(&self, account_id: AccountId) -> Result<CoinBalanceDBResponse> {
        self.store
            .read_balance(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound { account_id })
    }

    /// Credit the configured bonus once per account.
    ///
    /// A repeat call is not an error: it reports `granted = false` and the unchanged balance.
    #[instrument(skip(self), fields(account_id = %abbrev_uuid(&account_id)), err)]
    pub async fn grant_first_login_bonus(&self, account_id: AccountId) -> Result<BonusGrantDBResponse> {
        let grant = self.store.grant_bonus(account_id, self.first_login_bonus).await?;

        if grant.granted {
            info!(amount = self.first_login_bonus, new_balance = grant.new_balance, "Granted first login bonus");
        } else {
            debug!("First login bonus already granted");
        }

        Ok(grant)
    }

    /// Credit or debit an account, appending the paired transaction.
    ///
    /// Fails with [`LedgerError::InsufficientBalance`] if the balance would go negative.
    #[instrument(skip(self, description), fields(account_id = %abbrev_uuid(&account_id)), err)]
    pub async fn adjust_balance(
        &self,
        account_id: AccountId,
        amount: i64,
        transaction_type: CoinTransactionType,
        description: Option<String>,
    ) -> Result<CoinTransactionDBResponse> {
        if amount == 0 {
            return Err(LedgerError::InvalidRequest {
                message: "Adjustment amount cannot be zero".to_string(),
            });
        }
        if transaction_type == CoinTransactionType::Bonus {
            return Err(LedgerError::InvalidRequest {
                message: "Bonus transactions are only created by the first login grant".to_string(),
            });
        }

        let request = CoinTransactionCreateDBRequest {
            account_id,
            transaction_type,
            amount,
            description,
        };
        let transaction = self.store.apply_delta(&request).await?;

        info!(amount, new_balance = transaction.balance_after, "Adjusted balance");
        Ok(transaction)
    }

    /// Transactions for an account, newest first
    pub async fn list_transactions(&self, account_id: AccountId, skip: i64, limit: i64) -> Result<Vec<CoinTransactionDBResponse>> {
        self.store
            .list_transactions(&CoinTransactionFilter::new(account_id, skip, limit))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::InMemoryLedger;
    use futures::future::join_all;
    use uuid::Uuid;

    async fn accounts() -> (CoinAccounts, AccountId) {
        let accounts = CoinAccounts::new(Arc::new(InMemoryLedger::new()), 50);
        let account_id = Uuid::new_v4();
        accounts.provision(account_id).await.unwrap();
        (accounts, account_id)
    }

    #[test_log::test(tokio::test)]
    async fn test_first_login_bonus_is_granted_once() {
        let (accounts, account_id) = accounts().await;

        let first = accounts.grant_first_login_bonus(account_id).await.unwrap();
        let second = accounts.grant_first_login_bonus(account_id).await.unwrap();

        assert!(first.granted);
        assert_eq!(first.new_balance, 50);
        assert!(!second.granted);
        assert_eq!(second.new_balance, 50);

        let transactions = accounts.list_transactions(account_id, 0, 10).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].transaction_type, CoinTransactionType::Bonus);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bonus_grants_credit_once() {
        let (accounts, account_id) = accounts().await;

        let results = join_all((0..10).map(|_| accounts.grant_first_login_bonus(account_id))).await;

        let granted = results.iter().filter(|r| matches!(r, Ok(grant) if grant.granted)).count();
        assert_eq!(granted, 1);
        assert_eq!(accounts.get_balance(account_id).await.unwrap().balance, 50);
    }

    #[tokio::test]
    async fn test_adjust_balance_credit_and_debit() {
        let (accounts, account_id) = accounts().await;

        let credit = accounts
            .adjust_balance(account_id, 40, CoinTransactionType::Adjustment, Some("Support credit".to_string()))
            .await
            .unwrap();
        assert_eq!(credit.balance_after, 40);

        let debit = accounts
            .adjust_balance(account_id, -15, CoinTransactionType::Purchase, None)
            .await
            .unwrap();
        assert_eq!(debit.balance_after, 25);
        assert_eq!(accounts.get_balance(account_id).await.unwrap().balance, 25);
    }

    #[tokio::test]
    async fn test_adjust_balance_rejects_overdraft() {
        let (accounts, account_id) = accounts().await;
        accounts.grant_first_login_bonus(account_id).await.unwrap();

        let err = accounts
            .adjust_balance(account_id, -60, CoinTransactionType::Adjustment, None)
            .await
            .unwrap_err();

        assert_eq!(err.shortfall(), Some(10));
        assert_eq!(accounts.get_balance(account_id).await.unwrap().balance, 50);
        assert_eq!(accounts.list_transactions(account_id, 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_adjust_balance_rejects_zero_and_bonus() {
        let (accounts, account_id) = accounts().await;

        assert!(matches!(
            accounts.adjust_balance(account_id, 0, CoinTransactionType::Adjustment, None).await,
            Err(LedgerError::InvalidRequest { .. })
        ));
        assert!(matches!(
            accounts.adjust_balance(account_id, 10, CoinTransactionType::Bonus, None).await,
            Err(LedgerError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_balance_for_unknown_account() {
        let accounts = CoinAccounts::new(Arc::new(InMemoryLedger::new()), 50);
        assert!(matches!(
            accounts.get_balance(Uuid::new_v4()).await,
            Err(LedgerError::AccountNotFound { .. })
        ));
    }
}
