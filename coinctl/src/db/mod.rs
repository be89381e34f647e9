//! Postgres persistence for the coin ledger.
//!
//! This module implements the relational side of the ledger store using SQLx with PostgreSQL.
//! It follows the Repository pattern; the atomic operations that combine several repositories
//! live in [`crate::ledger::postgres`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Services   │  (redemption engine, coin accounts, catalog)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ LedgerStore │  (ledger::postgres - one SQL transaction per operation)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations
//! - [`models`]: Record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Transactions
//!
//! Repositories never open or commit transactions themselves. Always create repositories from a
//! transaction when the operation writes:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let mut balances = Balances::new(&mut tx);
//! // ... operations ...
//! tx.commit().await?;
//! ```
//!
//! # Migrations
//!
//! Database migrations are managed by SQLx and located in the `migrations/` directory.
//! The [`crate::migrator`] function provides access to the migrator:
//!
//! ```ignore
//! coinctl::migrator().run(&pool).await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
