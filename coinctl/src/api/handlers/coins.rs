use crate::{
    AppState,
    api::models::{
        coins::{AccountAuditResponse, BalanceAdjustmentCreate, BalanceResponse, CoinTransactionResponse, FirstLoginBonusResponse, ListTransactionsQuery},
        rewards::AccountSnapshotResponse,
    },
    auth::current_account::{CurrentAccount, RequiresAdmin},
    db::models::transactions::CoinTransactionType,
    errors::{Error, Result},
    openapi::LedgerErrorResponse,
    types::AccountId,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

/// Grant the first login bonus to the current account
#[utoipa::path(
    post,
    path = "/coins/first-login-bonus",
    tag = "coins",
    summary = "Grant first login bonus",
    description = "Credit the one-time first login bonus. Calling it again is harmless: it returns `granted: false` and the unchanged balance.",
    responses(
        (status = 200, description = "Bonus granted, or already granted earlier", body = FirstLoginBonusResponse),
        (status = 401, description = "Not authenticated"),
        (status = 503, description = "Ledger store unavailable, safe to retry"),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn grant_first_login_bonus(State(state): State<AppState>, account: CurrentAccount) -> Result<Json<FirstLoginBonusResponse>> {
    let grant = account.client(&state).grant_first_login_bonus().await?;
    Ok(Json(grant.into()))
}

/// Get the current account's coin balance
#[utoipa::path(
    get,
    path = "/coins/balance",
    tag = "coins",
    summary = "Get coin balance",
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 401, description = "Not authenticated"),
        (status = 503, description = "Ledger store unavailable, safe to retry"),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_balance(State(state): State<AppState>, account: CurrentAccount) -> Result<Json<BalanceResponse>> {
    let balance = state.ledger.accounts.get_balance(account.id).await?;
    Ok(Json(balance.into()))
}

/// List the current account's coin transactions
#[utoipa::path(
    get,
    path = "/coins/transactions",
    tag = "coins",
    summary = "List coin transactions",
    description = "Transaction history for the current account, newest first",
    params(ListTransactionsQuery),
    responses(
        (status = 200, description = "List of transactions", body = [CoinTransactionResponse]),
        (status = 401, description = "Not authenticated"),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
    account: CurrentAccount,
) -> Result<Json<Vec<CoinTransactionResponse>>> {
    let transactions = state
        .ledger
        .accounts
        .list_transactions(account.id, query.skip(), query.limit())
        .await?;

    Ok(Json(transactions.into_iter().map(CoinTransactionResponse::from).collect()))
}

/// Get the current account's cached storefront snapshot
#[utoipa::path(
    get,
    path = "/users/current/snapshot",
    tag = "coins",
    summary = "Get account snapshot",
    description = "Balance, active rewards and redeemed rewards in one call. Served from a short-lived cache that is refreshed after every change made through this API.",
    responses(
        (status = 200, description = "Account snapshot", body = AccountSnapshotResponse),
        (status = 401, description = "Not authenticated"),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_snapshot(State(state): State<AppState>, account: CurrentAccount) -> Result<Json<AccountSnapshotResponse>> {
    let snapshot = account.client(&state).snapshot().await?;
    Ok(Json(snapshot.as_ref().into()))
}

/// Credit or debit an account (admin only)
#[utoipa::path(
    post,
    path = "/admin/accounts/{account_id}/adjustments",
    tag = "admin",
    summary = "Adjust an account balance",
    params(
        ("account_id" = String, Path, description = "Account ID (UUID)"),
    ),
    request_body = BalanceAdjustmentCreate,
    responses(
        (status = 201, description = "Adjustment applied", body = CoinTransactionResponse),
        (status = 400, description = "Zero amount or disallowed transaction type"),
        (status = 402, description = "Debit would make the balance negative", body = LedgerErrorResponse),
        (status = 403, description = "Not an admin account"),
        (status = 404, description = "Account has no coin balance"),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn adjust_balance(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
    _admin: RequiresAdmin,
    Json(data): Json<BalanceAdjustmentCreate>,
) -> Result<(StatusCode, Json<CoinTransactionResponse>)> {
    let transaction_type = data.transaction_type.unwrap_or(CoinTransactionType::Adjustment);
    if transaction_type == CoinTransactionType::Redemption {
        return Err(Error::BadRequest {
            message: "Redemptions can only be made through the redeem endpoint".to_string(),
        });
    }

    let transaction = state
        .ledger
        .accounts
        .adjust_balance(account_id, data.amount, transaction_type, data.description)
        .await?;

    // The account's cached snapshot is now stale
    state.snapshots.invalidate(account_id).await;

    Ok((StatusCode::CREATED, Json(transaction.into())))
}

/// Check one account's balance against its transaction log (admin only)
#[utoipa::path(
    get,
    path = "/admin/accounts/{account_id}/audit",
    tag = "admin",
    summary = "Audit an account",
    params(
        ("account_id" = String, Path, description = "Account ID (UUID)"),
    ),
    responses(
        (status = 200, description = "Audit result", body = AccountAuditResponse),
        (status = 403, description = "Not an admin account"),
        (status = 404, description = "Account has no coin balance"),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn audit_account(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
    _admin: RequiresAdmin,
) -> Result<Json<AccountAuditResponse>> {
    let audit = state.ledger.audit.audit_account(account_id).await?;
    Ok(Json(audit.into()))
}

/// Check every account's balance against its transaction log (admin only)
#[utoipa::path(
    get,
    path = "/admin/audit",
    tag = "admin",
    summary = "Audit all accounts",
    responses(
        (status = 200, description = "Audit result per account", body = [AccountAuditResponse]),
        (status = 403, description = "Not an admin account"),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn audit_all(State(state): State<AppState>, _admin: RequiresAdmin) -> Result<Json<Vec<AccountAuditResponse>>> {
    let audits = state.ledger.audit.audit_all().await?;
    Ok(Json(audits.into_iter().map(AccountAuditResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use crate::api::models::coins::{AccountAuditResponse, BalanceResponse, CoinTransactionResponse, FirstLoginBonusResponse};
    use crate::api::models::rewards::AccountSnapshotResponse;
    use crate::db::models::transactions::CoinTransactionType;
    use crate::test_utils::{ACCOUNT_HEADER, create_test_app, create_test_app_with_admin};
    use axum::http::StatusCode;
    use serde_json::json;
    use uuid::Uuid;

    #[test_log::test(tokio::test)]
    async fn test_first_login_bonus_is_idempotent() {
        let (server, _store) = create_test_app();
        let account = Uuid::new_v4().to_string();

        let first = server
            .post("/api/v1/coins/first-login-bonus")
            .add_header(ACCOUNT_HEADER, &account)
            .await;
        first.assert_status_ok();
        let first: FirstLoginBonusResponse = first.json();
        assert!(first.granted);
        assert_eq!(first.new_balance, 50);

        let second: FirstLoginBonusResponse = server
            .post("/api/v1/coins/first-login-bonus")
            .add_header(ACCOUNT_HEADER, &account)
            .await
            .json();
        assert!(!second.granted);
        assert_eq!(second.new_balance, 50);

        let balance: BalanceResponse = server
            .get("/api/v1/coins/balance")
            .add_header(ACCOUNT_HEADER, &account)
            .await
            .json();
        assert_eq!(balance.balance, 50);
        assert!(balance.has_received_first_login_bonus);
    }

    #[tokio::test]
    async fn test_requests_without_identity_are_rejected() {
        let (server, _store) = create_test_app();

        let response = server.get("/api/v1/coins/balance").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["code"], "not_authenticated");

        server
            .get("/api/v1/coins/balance")
            .add_header(ACCOUNT_HEADER, "nobody")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_store_outage_is_retryable() {
        let (server, store) = create_test_app();
        store.set_available(false);

        let response = server
            .post("/api/v1/coins/first-login-bonus")
            .add_header(ACCOUNT_HEADER, Uuid::new_v4().to_string())
            .await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = response.json();
        assert_eq!(body["code"], "store_unavailable");
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn test_new_account_starts_at_zero() {
        let (server, _store) = create_test_app();

        let balance: BalanceResponse = server
            .get("/api/v1/coins/balance")
            .add_header(ACCOUNT_HEADER, Uuid::new_v4().to_string())
            .await
            .json();

        assert_eq!(balance.balance, 0);
        assert!(!balance.has_received_first_login_bonus);
    }

    #[tokio::test]
    async fn test_list_transactions_newest_first() {
        let (server, admin) = create_test_app_with_admin();
        let account = Uuid::new_v4();

        server
            .post("/api/v1/coins/first-login-bonus")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .assert_status_ok();
        server
            .post(&format!("/api/v1/admin/accounts/{account}/adjustments"))
            .add_header(ACCOUNT_HEADER, admin.to_string())
            .json(&json!({ "amount": -20, "description": "Correction" }))
            .await
            .assert_status(StatusCode::CREATED);

        let transactions: Vec<CoinTransactionResponse> = server
            .get("/api/v1/coins/transactions")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .json();

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].amount, -20);
        assert_eq!(transactions[0].balance_after, 30);
        assert_eq!(transactions[0].transaction_type, CoinTransactionType::Adjustment);
        assert_eq!(transactions[1].transaction_type, CoinTransactionType::Bonus);

        let page: Vec<CoinTransactionResponse> = server
            .get("/api/v1/coins/transactions?skip=1&limit=1")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .json();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].transaction_type, CoinTransactionType::Bonus);
    }

    #[tokio::test]
    async fn test_adjustment_requires_admin() {
        let (server, _admin) = create_test_app_with_admin();
        let account = Uuid::new_v4();

        server
            .post(&format!("/api/v1/admin/accounts/{account}/adjustments"))
            .add_header(ACCOUNT_HEADER, account.to_string())
            .json(&json!({ "amount": 1000 }))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_overdraft_adjustment_reports_shortfall() {
        let (server, admin) = create_test_app_with_admin();
        let account = Uuid::new_v4();
        server
            .post("/api/v1/coins/first-login-bonus")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .assert_status_ok();

        let response = server
            .post(&format!("/api/v1/admin/accounts/{account}/adjustments"))
            .add_header(ACCOUNT_HEADER, admin.to_string())
            .json(&json!({ "amount": -75 }))
            .await;

        response.assert_status(StatusCode::PAYMENT_REQUIRED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["code"], "insufficient_balance");
        assert_eq!(body["balance"], 50);
        assert_eq!(body["required"], 75);
        assert_eq!(body["shortfall"], 25);
    }

    #[tokio::test]
    async fn test_redemption_type_rejected_for_adjustments() {
        let (server, admin) = create_test_app_with_admin();

        server
            .post(&format!("/api/v1/admin/accounts/{admin}/adjustments"))
            .add_header(ACCOUNT_HEADER, admin.to_string())
            .json(&json!({ "amount": -5, "transaction_type": "redemption" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_snapshot_reflects_admin_adjustment() {
        let (server, admin) = create_test_app_with_admin();
        let account = Uuid::new_v4();

        let before: AccountSnapshotResponse = server
            .get("/api/v1/users/current/snapshot")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .json();
        assert_eq!(before.balance.balance, 0);

        server
            .post(&format!("/api/v1/admin/accounts/{account}/adjustments"))
            .add_header(ACCOUNT_HEADER, admin.to_string())
            .json(&json!({ "amount": 40 }))
            .await
            .assert_status(StatusCode::CREATED);

        let after: AccountSnapshotResponse = server
            .get("/api/v1/users/current/snapshot")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .json();
        assert_eq!(after.balance.balance, 40);
    }

    #[tokio::test]
    async fn test_audit_endpoints() {
        let (server, admin) = create_test_app_with_admin();
        let account = Uuid::new_v4();
        server
            .post("/api/v1/coins/first-login-bonus")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .assert_status_ok();

        let audit: AccountAuditResponse = server
            .get(&format!("/api/v1/admin/accounts/{account}/audit"))
            .add_header(ACCOUNT_HEADER, admin.to_string())
            .await
            .json();
        assert_eq!(audit.balance, 50);
        assert_eq!(audit.transaction_sum, 50);
        assert!(audit.consistent);

        let all: Vec<AccountAuditResponse> = server
            .get("/api/v1/admin/audit")
            .add_header(ACCOUNT_HEADER, admin.to_string())
            .await
            .json();
        // The admin account is provisioned by its own request
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|a| a.consistent));
    }
}
