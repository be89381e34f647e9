//! Schemas for bodies that are built with `serde_json` rather than a typed struct.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of every failed ledger operation.
///
/// `balance`, `required` and `shortfall` are only present for `insufficient_balance`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "code": "insufficient_balance",
    "message": "You need 30 more coins to redeem this reward.",
    "retryable": false,
    "balance": 50,
    "required": 80,
    "shortfall": 30
}))]
pub struct LedgerErrorResponse {
    /// Stable machine-readable error code
    #[schema(example = "reward_unavailable")]
    pub code: String,
    /// Message suitable for showing to the account holder
    pub message: String,
    /// Whether the same request may be sent again, with the same idempotency key for redemptions
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<i64>,
}
