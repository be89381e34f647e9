//! Database record models matching table schemas.
//!
//! This module contains struct definitions that correspond to ledger table rows. Both ledger
//! backends (Postgres and in-memory) return these types, so the services above them don't
//! care which store they run against.
//!
//! # Model Categories
//!
//! - [`balances`]: One coin balance row per account
//! - [`transactions`]: Append-only coin transaction log
//! - [`rewards`]: Reward catalog entries
//! - [`user_rewards`]: Completed redemptions and their usage state
//!
//! # Conversion to API Models
//!
//! Database models implement `From` conversions into the API models in
//! [`crate::api::models`]:
//!
//! ```ignore
//! use coinctl::api::models::coins::CoinTransactionResponse;
//!
//! let response: CoinTransactionResponse = db_transaction.into();
//! ```

pub mod balances;
pub mod rewards;
pub mod transactions;
pub mod user_rewards;
