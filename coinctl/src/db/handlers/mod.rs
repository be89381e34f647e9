//! Repository implementations for database access.
//!
//! This module provides repository structs for each ledger table. Repositories follow a
//! consistent pattern:
//!
//! - Wrap a SQLx connection or transaction
//! - Provide strongly-typed operations with parameter binding
//! - Return models from [`crate::db::models`]
//! - Leave transaction boundaries to the caller
//!
//! # Available Repositories
//!
//! - [`Balances`]: Coin balance rows and their guarded updates
//! - [`Transactions`]: Append-only coin transaction log
//! - [`Rewards`]: Reward catalog
//! - [`UserRewards`]: Redemption records
//!
//! # Common Pattern
//!
//! Mutations that must be atomic run several repositories over one transaction:
//!
//! ```ignore
//! use coinctl::db::handlers::{Balances, Transactions};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!
//!     let new_balance = Balances::new(&mut tx).apply_delta(account_id, -30).await?;
//!     Transactions::new(&mut tx).append(&request, new_balance.unwrap(), now).await?;
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

pub mod balances;
pub mod rewards;
pub mod transactions;
pub mod user_rewards;

pub use balances::Balances;
pub use rewards::Rewards;
pub use transactions::Transactions;
pub use user_rewards::UserRewards;
