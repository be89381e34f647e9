//! OpenAPI document for the `/api/v1` surface, rendered with Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

mod extra_types;

pub use extra_types::LedgerErrorResponse;

use crate::api;

/// The identity header set by the upstream proxy.
struct AccountHeaderAddon;

impl Modify for AccountHeaderAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "X-Account-Id".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-account-id",
                    "Account UUID, set by the authenticating proxy in front of this service. \
                     The header name is configurable with `auth.account_header`.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/api/v1", description = "Coin ledger API"),
    ),
    modifiers(&AccountHeaderAddon),
    paths(
        api::handlers::coins::grant_first_login_bonus,
        api::handlers::coins::get_balance,
        api::handlers::coins::list_transactions,
        api::handlers::coins::get_snapshot,
        api::handlers::rewards::list_rewards,
        api::handlers::rewards::redeem_reward,
        api::handlers::rewards::list_my_rewards,
        api::handlers::rewards::use_reward,
        api::handlers::coins::adjust_balance,
        api::handlers::coins::audit_account,
        api::handlers::coins::audit_all,
        api::handlers::rewards::create_reward,
        api::handlers::rewards::update_reward,
    ),
    components(
        schemas(
            api::models::coins::BalanceAdjustmentCreate,
            api::models::coins::BalanceResponse,
            api::models::coins::FirstLoginBonusResponse,
            api::models::coins::CoinTransactionResponse,
            api::models::coins::AccountAuditResponse,
            api::models::rewards::RewardCreate,
            api::models::rewards::RewardUpdate,
            api::models::rewards::RewardResponse,
            api::models::rewards::UserRewardResponse,
            api::models::rewards::MyRewardResponse,
            api::models::rewards::RedeemResponse,
            api::models::rewards::AccountSnapshotResponse,
            crate::db::models::rewards::RewardKind,
            crate::db::models::transactions::CoinTransactionType,
            LedgerErrorResponse,
        )
    ),
    tags(
        (name = "coins", description = "Coin balance, first login bonus and transaction history"),
        (name = "rewards", description = "Reward catalog and redemption.

Redeeming debits the reward's cost and records the redemption in one step. Send an \
`Idempotency-Key` header so a retry after a timeout cannot debit twice."),
        (name = "admin", description = "Balance adjustments, catalog maintenance and consistency audits. \
Restricted to accounts listed in `auth.admin_accounts`."),
    ),
    info(
        title = "Coin Ledger API",
        version = "1.0.0",
        description = "Coin balances, a first login bonus, and a catalog of rewards redeemable for coins.

## Authentication

Requests carry the caller's account UUID in the `x-account-id` header, set by the proxy that authenticated them.

## Errors

Ledger failures return a JSON body with a stable `code`, a displayable `message` and a `retryable` flag. \
Insufficient balance (402) also reports `balance`, `required` and `shortfall`.",
    ),
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();

        for expected in [
            "/coins/first-login-bonus",
            "/coins/balance",
            "/rewards/{reward_id}/redeem",
            "/users/current/rewards/{user_reward_id}/use",
            "/admin/rewards/{reward_id}",
            "/admin/audit",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("X-Account-Id"));
        assert!(components.schemas.contains_key("LedgerErrorResponse"));
    }
}
