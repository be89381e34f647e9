use crate::{
    AppState,
    api::models::rewards::{MyRewardResponse, RedeemResponse, RewardCreate, RewardResponse, RewardUpdate, UserRewardResponse},
    auth::current_account::{CurrentAccount, RequiresAdmin},
    client::{RedeemAttempt, RedeemFeedback},
    errors::{Error, Result},
    openapi::LedgerErrorResponse,
    types::{MAX_REQUEST_ID_LEN, RequestId, RewardId, UserRewardId},
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};

/// Header carrying the caller's idempotency key for a redemption
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Read an optional idempotency key; present but unusable is a client error
fn idempotency_key(headers: &HeaderMap) -> Result<Option<RequestId>> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(RequestId::parse)
        .map(Some)
        .ok_or_else(|| Error::BadRequest {
            message: format!("Idempotency-Key must be 1 to {MAX_REQUEST_ID_LEN} printable characters"),
        })
}

/// List rewards that can currently be redeemed
#[utoipa::path(
    get,
    path = "/rewards",
    tag = "rewards",
    summary = "List active rewards",
    description = "Active catalog entries, cheapest first",
    responses(
        (status = 200, description = "List of active rewards", body = [RewardResponse]),
        (status = 401, description = "Not authenticated"),
        (status = 503, description = "Ledger store unavailable, safe to retry"),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_rewards(State(state): State<AppState>, _account: CurrentAccount) -> Result<Json<Vec<RewardResponse>>> {
    let rewards = state.ledger.catalog.list_active_rewards().await?;
    Ok(Json(rewards.into_iter().map(RewardResponse::from).collect()))
}

/// Exchange coins for a reward
#[utoipa::path(
    post,
    path = "/rewards/{reward_id}/redeem",
    tag = "rewards",
    summary = "Redeem a reward",
    description = "Debit the reward's cost and record the redemption in one atomic step. \
        Send an `Idempotency-Key` header to make retries safe: a repeated key returns the earlier \
        redemption without debiting again.",
    params(
        ("reward_id" = String, Path, description = "Reward ID (UUID)"),
        ("Idempotency-Key" = Option<String>, Header, description = "Caller-chosen key identifying this redemption attempt"),
    ),
    responses(
        (status = 201, description = "Reward redeemed", body = RedeemResponse),
        (status = 200, description = "Idempotency key matched an earlier redemption; nothing was debited", body = RedeemResponse),
        (status = 400, description = "Malformed idempotency key, or key reused for a different reward"),
        (status = 401, description = "Not authenticated"),
        (status = 402, description = "Not enough coins; the body reports the shortfall", body = LedgerErrorResponse),
        (status = 404, description = "Reward does not exist or is no longer active", body = LedgerErrorResponse),
        (status = 409, description = "Concurrent modification persisted after retries; safe to retry with the same key", body = LedgerErrorResponse),
        (status = 503, description = "Ledger store unavailable; safe to retry with the same key", body = LedgerErrorResponse),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all, fields(reward_id = %reward_id))]
pub async fn redeem_reward(
    State(state): State<AppState>,
    Path(reward_id): Path<RewardId>,
    headers: HeaderMap,
    account: CurrentAccount,
) -> Result<(StatusCode, Json<RedeemResponse>)> {
    let attempt = match idempotency_key(&headers)? {
        Some(request_id) => RedeemAttempt::with_request_id(reward_id, request_id),
        None => RedeemAttempt::new(reward_id),
    };

    let result = account.client(&state).redeem_reward(&attempt).await;
    let feedback = RedeemFeedback::from_result(&result);
    let redemption = result?;

    let status = if redemption.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(RedeemResponse::new(redemption, feedback.message))))
}

/// List the current account's redeemed rewards
#[utoipa::path(
    get,
    path = "/users/current/rewards",
    tag = "rewards",
    summary = "List my rewards",
    description = "Redeemed rewards with their catalog entries, newest first",
    responses(
        (status = 200, description = "List of redeemed rewards", body = [MyRewardResponse]),
        (status = 401, description = "Not authenticated"),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_my_rewards(State(state): State<AppState>, account: CurrentAccount) -> Result<Json<Vec<MyRewardResponse>>> {
    let rewards = state.ledger.redemptions.my_rewards(account.id).await?;
    Ok(Json(rewards.into_iter().map(MyRewardResponse::from).collect()))
}

/// Mark a redeemed reward as used
#[utoipa::path(
    post,
    path = "/users/current/rewards/{user_reward_id}/use",
    tag = "rewards",
    summary = "Use a redeemed reward",
    params(
        ("user_reward_id" = String, Path, description = "Redeemed reward ID (UUID)"),
    ),
    responses(
        (status = 200, description = "Reward marked as used", body = UserRewardResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such redeemed reward for this account"),
        (status = 409, description = "Reward was already used", body = LedgerErrorResponse),
        (status = 410, description = "Reward has expired", body = LedgerErrorResponse),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn use_reward(
    State(state): State<AppState>,
    Path(user_reward_id): Path<UserRewardId>,
    account: CurrentAccount,
) -> Result<Json<UserRewardResponse>> {
    let used = account.client(&state).use_reward(user_reward_id).await?;
    Ok(Json(used.into()))
}

/// Add a reward to the catalog (admin only)
#[utoipa::path(
    post,
    path = "/admin/rewards",
    tag = "admin",
    summary = "Create a reward",
    request_body = RewardCreate,
    responses(
        (status = 201, description = "Reward created", body = RewardResponse),
        (status = 400, description = "Invalid name, cost or reward payload"),
        (status = 403, description = "Not an admin account"),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_reward(
    State(state): State<AppState>,
    _admin: RequiresAdmin,
    Json(data): Json<RewardCreate>,
) -> Result<(StatusCode, Json<RewardResponse>)> {
    let reward = state.ledger.catalog.create_reward(data.into()).await?;
    Ok((StatusCode::CREATED, Json(reward.into())))
}

/// Activate or deactivate a reward (admin only)
#[utoipa::path(
    patch,
    path = "/admin/rewards/{reward_id}",
    tag = "admin",
    summary = "Update a reward",
    description = "Deactivated rewards disappear from the catalog and can no longer be redeemed. \
        Rewards that were already redeemed are unaffected.",
    params(
        ("reward_id" = String, Path, description = "Reward ID (UUID)"),
    ),
    request_body = RewardUpdate,
    responses(
        (status = 200, description = "Reward updated", body = RewardResponse),
        (status = 403, description = "Not an admin account"),
        (status = 404, description = "Reward not found"),
    ),
    security(("X-Account-Id" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_reward(
    State(state): State<AppState>,
    Path(reward_id): Path<RewardId>,
    _admin: RequiresAdmin,
    Json(data): Json<RewardUpdate>,
) -> Result<Json<RewardResponse>> {
    let reward = state.ledger.catalog.set_reward_active(reward_id, data.is_active).await?;
    Ok(Json(reward.into()))
}

#[cfg(test)]
mod tests {
    use crate::api::models::coins::BalanceResponse;
    use crate::api::models::rewards::{MyRewardResponse, RedeemResponse, RewardResponse, UserRewardResponse};
    use crate::db::models::rewards::RewardKind;
    use crate::test_utils::{ACCOUNT_HEADER, create_test_app_with_admin};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use uuid::Uuid;

    async fn create_reward(server: &TestServer, admin: Uuid, body: serde_json::Value) -> RewardResponse {
        let response = server
            .post("/api/v1/admin/rewards")
            .add_header(ACCOUNT_HEADER, admin.to_string())
            .json(&body)
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    async fn discount(server: &TestServer, admin: Uuid, cost: i64) -> RewardResponse {
        create_reward(
            server,
            admin,
            json!({ "name": "15% off", "cost": cost, "reward_type": "discount", "discount_percentage": 15 }),
        )
        .await
    }

    async fn funded_account(server: &TestServer) -> Uuid {
        let account = Uuid::new_v4();
        server
            .post("/api/v1/coins/first-login-bonus")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .assert_status_ok();
        account
    }

    #[test_log::test(tokio::test)]
    async fn test_redeem_round_trip() {
        let (server, admin) = create_test_app_with_admin();
        let reward = discount(&server, admin, 30).await;
        let account = funded_account(&server).await;

        let response = server
            .post(&format!("/api/v1/rewards/{}/redeem", reward.id))
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await;
        response.assert_status(StatusCode::CREATED);
        let redeemed: RedeemResponse = response.json();
        assert_eq!(redeemed.new_balance, 20);
        assert!(!redeemed.replayed);
        assert_eq!(redeemed.message, "Reward redeemed! You have 20 coins left.");
        assert!(redeemed.user_reward.expiry_date.is_some());

        let balance: BalanceResponse = server
            .get("/api/v1/coins/balance")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .json();
        assert_eq!(balance.balance, 20);

        let mine: Vec<MyRewardResponse> = server
            .get("/api/v1/users/current/rewards")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .json();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].reward.id, reward.id);
        assert_eq!(mine[0].user_reward.id, redeemed.user_reward.id);
    }

    #[tokio::test]
    async fn test_redeem_with_insufficient_balance() {
        let (server, admin) = create_test_app_with_admin();
        let reward = discount(&server, admin, 80).await;
        let account = funded_account(&server).await;

        let response = server
            .post(&format!("/api/v1/rewards/{}/redeem", reward.id))
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await;

        response.assert_status(StatusCode::PAYMENT_REQUIRED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["shortfall"], 30);
        assert_eq!(body["message"], "You need 30 more coins to redeem this reward.");

        let mine: Vec<MyRewardResponse> = server
            .get("/api/v1/users/current/rewards")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .json();
        assert!(mine.is_empty());
    }

    #[tokio::test]
    async fn test_idempotency_key_replays_redemption() {
        let (server, admin) = create_test_app_with_admin();
        let reward = discount(&server, admin, 30).await;
        let account = funded_account(&server).await;
        let path = format!("/api/v1/rewards/{}/redeem", reward.id);

        let first = server
            .post(&path)
            .add_header(ACCOUNT_HEADER, account.to_string())
            .add_header("Idempotency-Key", "checkout-7f3a")
            .await;
        first.assert_status(StatusCode::CREATED);
        let first: RedeemResponse = first.json();

        let second = server
            .post(&path)
            .add_header(ACCOUNT_HEADER, account.to_string())
            .add_header("Idempotency-Key", "checkout-7f3a")
            .await;
        second.assert_status_ok();
        let second: RedeemResponse = second.json();

        assert!(second.replayed);
        assert_eq!(second.user_reward.id, first.user_reward.id);
        assert_eq!(second.new_balance, 20);
        assert_eq!(second.user_reward.request_id.as_deref(), Some("checkout-7f3a"));

        let balance: BalanceResponse = server
            .get("/api/v1/coins/balance")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .json();
        assert_eq!(balance.balance, 20);
    }

    #[tokio::test]
    async fn test_blank_idempotency_key_is_rejected() {
        let (server, admin) = create_test_app_with_admin();
        let reward = discount(&server, admin, 30).await;
        let account = funded_account(&server).await;

        server
            .post(&format!("/api/v1/rewards/{}/redeem", reward.id))
            .add_header(ACCOUNT_HEADER, account.to_string())
            .add_header("Idempotency-Key", "   ")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deactivated_reward_cannot_be_redeemed() {
        let (server, admin) = create_test_app_with_admin();
        let reward = discount(&server, admin, 30).await;
        let account = funded_account(&server).await;

        let updated: RewardResponse = server
            .patch(&format!("/api/v1/admin/rewards/{}", reward.id))
            .add_header(ACCOUNT_HEADER, admin.to_string())
            .json(&json!({ "is_active": false }))
            .await
            .json();
        assert!(!updated.is_active);

        let listed: Vec<RewardResponse> = server
            .get("/api/v1/rewards")
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .json();
        assert!(listed.is_empty());

        let response = server
            .post(&format!("/api/v1/rewards/{}/redeem", reward.id))
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await;
        response.assert_status_not_found();
        let body: serde_json::Value = response.json();
        assert_eq!(body["code"], "reward_unavailable");
    }

    #[tokio::test]
    async fn test_list_rewards_cheapest_first() {
        let (server, admin) = create_test_app_with_admin();
        discount(&server, admin, 60).await;
        create_reward(
            &server,
            admin,
            json!({ "name": "Free mug", "cost": 25, "reward_type": "product", "product_id": 42 }),
        )
        .await;

        let listed: Vec<RewardResponse> = server
            .get("/api/v1/rewards")
            .add_header(ACCOUNT_HEADER, admin.to_string())
            .await
            .json();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Free mug");
        assert_eq!(listed[0].kind, RewardKind::FreeProduct { product_id: 42 });
        assert_eq!(listed[1].cost, 60);
    }

    #[tokio::test]
    async fn test_use_reward_once() {
        let (server, admin) = create_test_app_with_admin();
        let reward = discount(&server, admin, 30).await;
        let account = funded_account(&server).await;

        let redeemed: RedeemResponse = server
            .post(&format!("/api/v1/rewards/{}/redeem", reward.id))
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .json();
        let path = format!("/api/v1/users/current/rewards/{}/use", redeemed.user_reward.id);

        let used: UserRewardResponse = server
            .post(&path)
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .json();
        assert!(used.is_used);
        assert!(used.used_at.is_some());

        server
            .post(&path)
            .add_header(ACCOUNT_HEADER, account.to_string())
            .await
            .assert_status(StatusCode::CONFLICT);

        // Someone else's redemption is invisible
        server
            .post(&path)
            .add_header(ACCOUNT_HEADER, Uuid::new_v4().to_string())
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_create_reward_validation_and_permissions() {
        let (server, admin) = create_test_app_with_admin();

        server
            .post("/api/v1/admin/rewards")
            .add_header(ACCOUNT_HEADER, admin.to_string())
            .json(&json!({ "name": "Too generous", "cost": 10, "reward_type": "discount", "discount_percentage": 150 }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .post("/api/v1/admin/rewards")
            .add_header(ACCOUNT_HEADER, Uuid::new_v4().to_string())
            .json(&json!({ "name": "Sneaky", "cost": 10, "reward_type": "product", "product_id": 1 }))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
