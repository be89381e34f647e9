use crate::{
    AppState,
    client::LedgerClient,
    errors::{Error, Result},
    ledger::LedgerError,
    types::{AccountId, abbrev_uuid},
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use tracing::{debug, instrument, trace};
use uuid::Uuid;

/// The account the request acts for, as asserted by the upstream identity provider.
///
/// Extracting it provisions the account's balance row on first sight, so handlers can rely on
/// the row existing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentAccount {
    pub id: AccountId,
}

impl CurrentAccount {
    /// A cached ledger view for this account
    pub fn client(&self, state: &AppState) -> LedgerClient {
        LedgerClient::new(state.ledger.clone(), state.snapshots.clone(), self.id)
    }
}

/// Read the account id from the configured identity header
fn account_from_headers(headers: &HeaderMap, header_name: &str) -> Result<AccountId> {
    let value = headers.get(header_name).ok_or(Error::Ledger(LedgerError::NotAuthenticated))?;

    value
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or_else(|| {
            trace!("Identity header present but not a valid account id");
            Error::Ledger(LedgerError::NotAuthenticated)
        })
}

impl FromRequestParts<AppState> for CurrentAccount {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let id = account_from_headers(&parts.headers, &state.config.auth.account_header)?;

        state.ledger.accounts.provision(id).await?;
        debug!("Authenticated account {}", abbrev_uuid(&id));

        Ok(CurrentAccount { id })
    }
}

/// Guard for administrative routes: the current account must be listed in `auth.admin_accounts`
#[derive(Debug, Clone, Copy)]
pub struct RequiresAdmin(pub CurrentAccount);

pub fn require_admin(account: CurrentAccount, admins: &[AccountId]) -> Result<CurrentAccount> {
    if admins.contains(&account.id) {
        Ok(account)
    } else {
        Err(Error::InsufficientPermissions {
            action: "manage the coin ledger".to_string(),
        })
    }
}

impl FromRequestParts<AppState> for RequiresAdmin {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let account = CurrentAccount::from_request_parts(parts, state).await?;
        require_admin(account, &state.config.auth.admin_accounts).map(RequiresAdmin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, ledger::memory::InMemoryLedger};
    use axum::http::StatusCode;
    use std::sync::Arc;

    fn parts_with_header(name: &str, value: &str) -> Parts {
        let request = axum::http::Request::builder()
            .uri("http://localhost/test")
            .header(name, value)
            .body(())
            .unwrap();
        request.into_parts().0
    }

    fn state(config: Config) -> AppState {
        AppState::from_store(Arc::new(InMemoryLedger::new()), config)
    }

    #[tokio::test]
    async fn test_extraction_provisions_account() {
        let state = state(Config::default());
        let id = Uuid::new_v4();
        let mut parts = parts_with_header("x-account-id", &id.to_string());

        let account = CurrentAccount::from_request_parts(&mut parts, &state).await.unwrap();

        assert_eq!(account.id, id);
        let balance = state.ledger.accounts.get_balance(id).await.unwrap();
        assert_eq!(balance.balance, 0);
        assert!(!balance.has_received_first_login_bonus);
    }

    #[tokio::test]
    async fn test_custom_header_name() {
        let mut config = Config::default();
        config.auth.account_header = "x-user-id".to_string();
        let state = state(config);
        let id = Uuid::new_v4();

        let mut parts = parts_with_header("x-user-id", &id.to_string());
        assert!(CurrentAccount::from_request_parts(&mut parts, &state).await.is_ok());

        let mut parts = parts_with_header("x-account-id", &id.to_string());
        assert!(CurrentAccount::from_request_parts(&mut parts, &state).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_or_malformed_header_is_unauthorized() {
        let state = state(Config::default());

        let request = axum::http::Request::builder().uri("http://localhost/test").body(()).unwrap();
        let (mut parts, _body) = request.into_parts();
        let error = CurrentAccount::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);

        let mut parts = parts_with_header("x-account-id", "not-a-uuid");
        let error = CurrentAccount::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_require_admin() {
        let admin = CurrentAccount { id: Uuid::new_v4() };
        let regular = CurrentAccount { id: Uuid::new_v4() };
        let admins = vec![admin.id];

        assert!(require_admin(admin, &admins).is_ok());

        let error = require_admin(regular, &admins).unwrap_err();
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
    }
}
