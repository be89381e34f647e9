//! Authentication and authorization.
//!
//! The service performs no authentication of its own. An upstream identity provider (for
//! example oauth2-proxy) authenticates the user and forwards the account UUID in a trusted
//! header, `x-account-id` by default (see `auth.account_header`). Requests without a valid
//! header are rejected with `401 Not authenticated`.
//!
//! Administrative routes additionally require the account to be listed in
//! `auth.admin_accounts`.
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use coinctl::auth::current_account::CurrentAccount;
//!
//! async fn balance(State(state): State<AppState>, account: CurrentAccount) -> Result<Json<i64>> {
//!     let balance = state.ledger.accounts.get_balance(account.id).await?;
//!     Ok(Json(balance.balance))
//! }
//! ```

pub mod current_account;
