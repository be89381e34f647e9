//! Ledger behaviour against a real PostgreSQL database.
//!
//! These tests run only when `DATABASE_URL` points at a scratch database; otherwise they return
//! early. Every test uses fresh account and reward ids, so they can share one database.

use coinctl::{
    config::LedgerConfig,
    db::models::{
        rewards::{RewardCreateDBRequest, RewardKind},
        transactions::CoinTransactionType,
    },
    ledger::{LedgerError, LedgerStore, postgres::PostgresLedger},
    services::Ledger,
    types::RequestId,
};
use futures::future::join_all;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

async fn ledger() -> Option<(Ledger, Arc<dyn LedgerStore>)> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres ledger test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(&url)
        .await
        .expect("Failed to connect to DATABASE_URL");
    coinctl::migrator().run(&pool).await.expect("Failed to run migrations");

    let store: Arc<dyn LedgerStore> = Arc::new(PostgresLedger::new(pool));
    let config = LedgerConfig {
        conflict_backoff: Duration::from_millis(5),
        ..Default::default()
    };
    Some((Ledger::new(store.clone(), &config), store))
}

async fn discount(ledger: &Ledger, cost: i64) -> Uuid {
    ledger
        .catalog
        .create_reward(RewardCreateDBRequest {
            name: format!("Discount {}", Uuid::new_v4()),
            description: None,
            cost,
            image_url: None,
            kind: RewardKind::Discount { discount_percentage: 10 },
            is_active: true,
        })
        .await
        .expect("Failed to create reward")
        .id
}

#[test_log::test(tokio::test)]
async fn test_bonus_redeem_and_audit() {
    let Some((ledger, _store)) = ledger().await else { return };
    let account = Uuid::new_v4();
    ledger.accounts.provision(account).await.unwrap();
    let reward = discount(&ledger, 30).await;

    let grant = ledger.accounts.grant_first_login_bonus(account).await.unwrap();
    assert!(grant.granted);
    assert_eq!(grant.new_balance, 50);
    assert!(!ledger.accounts.grant_first_login_bonus(account).await.unwrap().granted);

    let redemption = ledger.redemptions.redeem(account, reward, None).await.unwrap();
    assert_eq!(redemption.new_balance, 20);
    assert!(redemption.user_reward.expiry_date.is_some());

    let err = ledger.redemptions.redeem(account, reward, None).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { balance: 20, required: 30 }));

    let transactions = ledger.accounts.list_transactions(account, 0, 10).await.unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].transaction_type, CoinTransactionType::Redemption);
    assert_eq!(transactions[0].amount, -30);

    let audit = ledger.audit.audit_account(account).await.unwrap();
    assert!(audit.consistent());
    assert_eq!(audit.balance, 20);
}

#[test_log::test(tokio::test)]
async fn test_concurrent_redemptions_never_overdraw() {
    let Some((ledger, _store)) = ledger().await else { return };
    let account = Uuid::new_v4();
    ledger.accounts.provision(account).await.unwrap();
    ledger
        .accounts
        .adjust_balance(account, 100, CoinTransactionType::Adjustment, None)
        .await
        .unwrap();
    let reward = discount(&ledger, 80).await;

    let results = join_all((0..8).map(|_| ledger.redemptions.redeem(account, reward, None))).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert_eq!(ledger.accounts.get_balance(account).await.unwrap().balance, 20);
    assert_eq!(ledger.redemptions.my_rewards(account).await.unwrap().len(), 1);
    assert!(ledger.audit.audit_account(account).await.unwrap().consistent());
}

#[test_log::test(tokio::test)]
async fn test_concurrent_bonus_grants_credit_once() {
    let Some((ledger, _store)) = ledger().await else { return };
    let account = Uuid::new_v4();
    ledger.accounts.provision(account).await.unwrap();

    let results = join_all((0..8).map(|_| ledger.accounts.grant_first_login_bonus(account))).await;

    let granted = results.iter().filter(|r| matches!(r, Ok(grant) if grant.granted)).count();
    assert_eq!(granted, 1);
    assert_eq!(ledger.accounts.get_balance(account).await.unwrap().balance, 50);
}

#[test_log::test(tokio::test)]
async fn test_request_id_replay_debits_once() {
    let Some((ledger, _store)) = ledger().await else { return };
    let account = Uuid::new_v4();
    ledger.accounts.provision(account).await.unwrap();
    ledger.accounts.grant_first_login_bonus(account).await.unwrap();
    let reward = discount(&ledger, 30).await;
    let request_id = RequestId::generate();

    let first = ledger
        .redemptions
        .redeem(account, reward, Some(request_id.clone()))
        .await
        .unwrap();
    let second = ledger.redemptions.redeem(account, reward, Some(request_id)).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.user_reward.id, first.user_reward.id);
    assert_eq!(second.new_balance, 20);
    assert_eq!(ledger.accounts.get_balance(account).await.unwrap().balance, 20);
}

#[test_log::test(tokio::test)]
async fn test_use_reward_once() {
    let Some((ledger, _store)) = ledger().await else { return };
    let account = Uuid::new_v4();
    ledger.accounts.provision(account).await.unwrap();
    ledger.accounts.grant_first_login_bonus(account).await.unwrap();
    let reward = discount(&ledger, 30).await;
    let redemption = ledger.redemptions.redeem(account, reward, None).await.unwrap();

    let used = ledger
        .redemptions
        .use_reward(account, redemption.user_reward.id)
        .await
        .unwrap();
    assert!(used.is_used);

    let err = ledger
        .redemptions
        .use_reward(account, redemption.user_reward.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::RewardAlreadyUsed { .. }));
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_concurrent_same_request_id_all_replay() {
    let Some((ledger, _store)) = ledger().await else { return };
    let reward = discount(&ledger, 30).await;

    for _ in 0..10 {
        let account = Uuid::new_v4();
        ledger.accounts.provision(account).await.unwrap();
        ledger.accounts.grant_first_login_bonus(account).await.unwrap();
        let request_id = RequestId::generate();

        let results = join_all((0..4).map(|_| ledger.redemptions.redeem(account, reward, Some(request_id.clone())))).await;

        let redemptions: Vec<_> = results
            .into_iter()
            .map(|r| r.expect("every call with the same request id should succeed"))
            .collect();
        assert_eq!(redemptions.iter().filter(|r| !r.replayed).count(), 1);
        assert!(redemptions.iter().all(|r| r.user_reward.id == redemptions[0].user_reward.id));
        assert!(redemptions.iter().all(|r| r.new_balance == 20));
        assert_eq!(ledger.accounts.get_balance(account).await.unwrap().balance, 20);
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_audit_during_concurrent_writes() {
    let Some((ledger, _store)) = ledger().await else { return };
    let account = Uuid::new_v4();
    ledger.accounts.provision(account).await.unwrap();

    let writer = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                ledger
                    .accounts
                    .adjust_balance(account, 1, CoinTransactionType::Adjustment, None)
                    .await
                    .unwrap();
            }
        })
    };

    while !writer.is_finished() {
        let audit = ledger.audit.audit_account(account).await.unwrap();
        assert!(audit.consistent(), "audit saw {audit:?}");
    }
    writer.await.unwrap();
    assert_eq!(ledger.audit.audit_account(account).await.unwrap().balance, 100);
}
