//! Operator check that every balance equals the sum of its transaction log.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    ledger::{LedgerError, LedgerStore, Result},
    types::{AccountId, abbrev_uuid},
};

/// Accounts audited at once by [`ConsistencyAudit::audit_all`]
const AUDIT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountAudit {
    pub account_id: AccountId,
    pub balance: i64,
    pub transaction_sum: i64,
}

impl AccountAudit {
    pub fn consistent(&self) -> bool {
        self.balance == self.transaction_sum
    }
}

#[derive(Clone)]
pub struct ConsistencyAudit {
    store: Arc<dyn LedgerStore>,
}

impl ConsistencyAudit {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn audit_account(&self, account_id: AccountId) -> Result<AccountAudit> {
        let read = self
            .store
            .audit_balance(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound { account_id })?;

        let audit = AccountAudit {
            account_id,
            balance: read.balance,
            transaction_sum: read.transaction_sum,
        };
        if !audit.consistent() {
            warn!(
                account_id = %abbrev_uuid(&account_id),
                balance = audit.balance,
                transaction_sum = audit.transaction_sum,
                "Balance does not match transaction log"
            );
        }
        Ok(audit)
    }

    /// Audit every provisioned account, in account id order
    pub async fn audit_all(&self) -> Result<Vec<AccountAudit>> {
        let account_ids = self.store.list_account_ids().await?;

        let audits: Vec<AccountAudit> = stream::iter(account_ids)
            .map(|account_id| self.audit_account(account_id))
            .buffered(AUDIT_CONCURRENCY)
            .try_collect()
            .await?;

        let inconsistent = audits.iter().filter(|a| !a.consistent()).count();
        info!(accounts = audits.len(), inconsistent, "Consistency audit finished");
        Ok(audits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::models::transactions::CoinTransactionCreateDBRequest, ledger::memory::InMemoryLedger};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_audit_after_mutations() {
        let store = Arc::new(InMemoryLedger::new());
        let audit = ConsistencyAudit::new(store.clone());

        for amount in [10, 25, 40] {
            let account_id = Uuid::new_v4();
            store.provision_account(account_id).await.unwrap();
            store.grant_bonus(account_id, 50).await.unwrap();
            store
                .apply_delta(&CoinTransactionCreateDBRequest::adjustment(account_id, -amount, None))
                .await
                .unwrap();

            let result = audit.audit_account(account_id).await.unwrap();
            assert_eq!(result.balance, 50 - amount);
            assert!(result.consistent());
        }

        let all = audit.audit_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(AccountAudit::consistent));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_audit_during_concurrent_writes() {
        let store = Arc::new(InMemoryLedger::new());
        let audit = ConsistencyAudit::new(store.clone());
        let account_id = Uuid::new_v4();
        store.provision_account(account_id).await.unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    store
                        .apply_delta(&CoinTransactionCreateDBRequest::adjustment(account_id, 1, None))
                        .await
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        while !writer.is_finished() {
            let result = audit.audit_account(account_id).await.unwrap();
            assert!(result.consistent(), "audit saw {result:?}");
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();

        let result = audit.audit_account(account_id).await.unwrap();
        assert_eq!(result.balance, 500);
        assert!(result.consistent());
    }

    #[tokio::test]
    async fn test_audit_unknown_account() {
        let audit = ConsistencyAudit::new(Arc::new(InMemoryLedger::new()));
        assert!(matches!(
            audit.audit_account(Uuid::new_v4()).await,
            Err(LedgerError::AccountNotFound { .. })
        ));
    }

    #[test]
    fn test_inconsistent_audit() {
        let audit = AccountAudit {
            account_id: Uuid::new_v4(),
            balance: 30,
            transaction_sum: 20,
        };
        assert!(!audit.consistent());
    }
}
