//! HTTP API: route handlers and their request/response models.
//!
//! All routes are nested under `/api/v1`:
//!
//! - **Coins** (`/coins/*`, `/users/current/snapshot`): first login bonus, balance, history
//! - **Rewards** (`/rewards/*`, `/users/current/rewards/*`): catalog, redemption, redeemed rewards
//! - **Admin** (`/admin/*`): balance adjustments, catalog maintenance, consistency audit
//!
//! Every handler is annotated for `utoipa`; the rendered docs are served at `/docs`.

pub mod handlers;
pub mod models;
