//! Axum route handlers.
//!
//! Handlers identify the caller with [`crate::auth::current_account::CurrentAccount`] (or
//! [`crate::auth::current_account::RequiresAdmin`] for `/admin` routes), call into
//! [`crate::services::Ledger`], and convert the result into an API model. Failures are returned
//! as [`crate::errors::Error`], which maps ledger errors to status codes.
//!
//! - [`coins`]: bonus, balance, transaction history, snapshot, adjustments and audit
//! - [`rewards`]: catalog listing, redemption, redeemed rewards, catalog maintenance

pub mod coins;
pub mod rewards;
