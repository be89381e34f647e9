use crate::client::failure_message;
use crate::ledger::LedgerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Caller is authenticated but not allowed to perform the operation
    #[error("Insufficient permissions to {action}")]
    InsufficientPermissions { action: String },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Ledger operation error
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Ledger(ledger_err) => match ledger_err {
                LedgerError::NotAuthenticated => StatusCode::UNAUTHORIZED,
                LedgerError::AccountNotFound { .. } => StatusCode::NOT_FOUND,
                LedgerError::RewardUnavailable { .. } => StatusCode::NOT_FOUND,
                LedgerError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
                LedgerError::Conflict { .. } => StatusCode::CONFLICT,
                LedgerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::UserRewardNotFound { .. } => StatusCode::NOT_FOUND,
                LedgerError::RewardAlreadyUsed { .. } => StatusCode::CONFLICT,
                LedgerError::RewardExpired { .. } => StatusCode::GONE,
                LedgerError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
                LedgerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::InsufficientPermissions { action } => format!("Insufficient permissions to {action}"),
            Error::BadRequest { message } => message.clone(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            Error::Ledger(ledger_err) => failure_message(ledger_err),
        }
    }
}

/// Stable machine-readable code for ledger failures
fn ledger_code(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::NotAuthenticated => "not_authenticated",
        LedgerError::AccountNotFound { .. } => "account_not_found",
        LedgerError::RewardUnavailable { .. } => "reward_unavailable",
        LedgerError::InsufficientBalance { .. } => "insufficient_balance",
        LedgerError::Conflict { .. } => "conflict",
        LedgerError::StoreUnavailable(_) => "store_unavailable",
        LedgerError::UserRewardNotFound { .. } => "user_reward_not_found",
        LedgerError::RewardAlreadyUsed { .. } => "reward_already_used",
        LedgerError::RewardExpired { .. } => "reward_expired",
        LedgerError::InvalidRequest { .. } => "invalid_request",
        LedgerError::Internal(_) => "internal",
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Ledger(LedgerError::Internal(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Ledger(LedgerError::StoreUnavailable(_) | LedgerError::Conflict { .. }) => {
                tracing::warn!("Transient ledger error: {}", self);
            }
            Error::Ledger(_) => {
                tracing::debug!("Ledger rejection: {}", self);
            }
            Error::InsufficientPermissions { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            // Ledger errors get a structured body so clients can branch on `code`
            Error::Ledger(ledger_err) => {
                let mut body = json!({
                    "code": ledger_code(ledger_err),
                    "message": self.user_message(),
                    "retryable": ledger_err.is_transient(),
                });
                if let LedgerError::InsufficientBalance { balance, required } = ledger_err {
                    body["balance"] = json!(balance);
                    body["required"] = json!(required);
                    body["shortfall"] = json!(ledger_err.shortfall());
                }
                (status, Json(body)).into_response()
            }
            _ => {
                let user_message = self.user_message();
                (status, user_message).into_response()
            }
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_ledger_status_mapping() {
        let cases = [
            (LedgerError::NotAuthenticated, StatusCode::UNAUTHORIZED),
            (LedgerError::RewardUnavailable { reward_id: Uuid::new_v4() }, StatusCode::NOT_FOUND),
            (LedgerError::InsufficientBalance { balance: 1, required: 2 }, StatusCode::PAYMENT_REQUIRED),
            (LedgerError::Conflict { attempts: 3 }, StatusCode::CONFLICT),
            (LedgerError::StoreUnavailable("down".to_string()), StatusCode::SERVICE_UNAVAILABLE),
            (
                LedgerError::RewardExpired {
                    user_reward_id: Uuid::new_v4(),
                },
                StatusCode::GONE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(Error::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = Error::Ledger(LedgerError::Internal(anyhow::anyhow!("connection string postgres://secret")));
        assert_eq!(err.user_message(), "Internal server error");

        let err = Error::Other(anyhow::anyhow!("boom"));
        assert_eq!(err.user_message(), "Internal server error");
    }

    #[test]
    fn test_insufficient_balance_message_shows_shortfall() {
        let err = Error::Ledger(LedgerError::InsufficientBalance { balance: 20, required: 80 });
        assert_eq!(err.user_message(), "You need 60 more coins to redeem this reward.");
    }
}
