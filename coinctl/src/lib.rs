//! # coinctl: coin ledger and reward redemption
//!
//! `coinctl` keeps a coin balance per account, grants a one-time first login bonus, and lets
//! accounts exchange coins for rewards from an administrator-managed catalog. It exposes these
//! operations as a JSON API over HTTP.
//!
//! ## Guarantees
//!
//! - Every balance change is paired with an appended transaction row in the same atomic step, so
//!   an account's balance always equals the sum of its transaction amounts.
//! - Balances never go negative. A redemption that would overdraw fails without side effects.
//! - A redemption debits, logs and records the redeemed reward together, or not at all.
//! - The first login bonus is credited at most once per account, even under concurrent calls.
//! - A redemption carrying an idempotency key is applied at most once; repeating the key returns
//!   the original result.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (api::handlers) ──> services::Ledger ──> ledger::LedgerStore
//!        │                        ▲                 ├── PostgresLedger (db::handlers)
//!        └──> client::LedgerClient┘                 └── InMemoryLedger
//! ```
//!
//! The **ledger store** ([`ledger`]) is the only component that mutates state, and each of its
//! mutating operations is atomic. The **services** ([`services`]) add validation, bonus and
//! expiry policy, and conflict retries on top of it. The **client** ([`client`]) is a per-account
//! view with a short-lived snapshot cache. The **API layer** ([`api`]) identifies the caller from
//! a trusted header ([`auth`]) and maps failures to status codes ([`errors`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use coinctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = coinctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     coinctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Database Setup
//!
//! With `database.type: external` the application connects to PostgreSQL and runs the bundled
//! migrations on startup. They can also be run directly:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! coinctl::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod ledger;
mod openapi;
pub mod services;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    client::SnapshotCache,
    config::{CorsOrigin, DatabaseConfig, PoolSettings},
    ledger::LedgerStore,
    openapi::ApiDoc,
    services::Ledger,
};
use axum::http::HeaderValue;
use axum::{
    Json, Router, http,
    routing::{get, patch, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{AccountId, RewardId, UserRewardId};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .ledger(Ledger::new(store, &config.ledger))
///     .snapshots(SnapshotCache::new(&config.client_cache))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub ledger: Ledger,
    /// Per-account snapshots shared by every request's [`client::LedgerClient`]
    pub snapshots: SnapshotCache,
}

impl AppState {
    /// Wire the services and the snapshot cache over a ledger store
    pub fn from_store(store: Arc<dyn LedgerStore>, config: Config) -> Self {
        AppState::builder()
            .ledger(Ledger::new(store, &config.ledger))
            .snapshots(SnapshotCache::new(&config.client_cache))
            .config(config)
            .build()
    }
}

/// Get the coinctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect to PostgreSQL with the configured pool sizing and bring the schema up to date
async fn setup_database(url: &str, settings: &PoolSettings) -> anyhow::Result<PgPool> {
    let mut options = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs));

    // 0 disables the timeout
    if settings.idle_timeout_secs > 0 {
        options = options.idle_timeout(Duration::from_secs(settings.idle_timeout_secs));
    }
    if settings.max_lifetime_secs > 0 {
        options = options.max_lifetime(Duration::from_secs(settings.max_lifetime_secs));
    }

    let pool = options.connect(url).await?;
    migrator().run(&pool).await?;
    debug!("Database migrations applied");

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.cors;

    let wildcard = cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard));
    let allow_origin = if wildcard {
        if cors_config.allow_credentials {
            anyhow::bail!("CORS wildcard origin cannot be combined with allow_credentials");
        }
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::PATCH])
        .allow_headers([
            http::header::CONTENT_TYPE,
            http::HeaderName::from_bytes(config.auth.account_header.as_bytes())?,
            http::HeaderName::from_static("idempotency-key"),
        ])
        .allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: the `/api/v1` routes, health check, OpenAPI docs, CORS and
/// request tracing.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        // Coins
        .route("/coins/first-login-bonus", post(api::handlers::coins::grant_first_login_bonus))
        .route("/coins/balance", get(api::handlers::coins::get_balance))
        .route("/coins/transactions", get(api::handlers::coins::list_transactions))
        .route("/users/current/snapshot", get(api::handlers::coins::get_snapshot))
        // Rewards
        .route("/rewards", get(api::handlers::rewards::list_rewards))
        .route("/rewards/{reward_id}/redeem", post(api::handlers::rewards::redeem_reward))
        .route("/users/current/rewards", get(api::handlers::rewards::list_my_rewards))
        .route(
            "/users/current/rewards/{user_reward_id}/use",
            post(api::handlers::rewards::use_reward),
        )
        // Admin
        .route(
            "/admin/accounts/{account_id}/adjustments",
            post(api::handlers::coins::adjust_balance),
        )
        .route("/admin/accounts/{account_id}/audit", get(api::handlers::coins::audit_account))
        .route("/admin/audit", get(api::handlers::coins::audit_all))
        .route("/admin/rewards", post(api::handlers::rewards::create_reward))
        .route("/admin/rewards/{reward_id}", patch(api::handlers::rewards::update_reward))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    // Tracing wraps CORS so rejected preflights are logged too
    let router = router.layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(create_cors_layer(&state.config)?),
    );

    Ok(router)
}

/// The HTTP service with its ledger store.
///
/// 1. **Create**: [`Application::new`] connects the configured store (running migrations for
///    PostgreSQL) and builds the router
/// 2. **Serve**: [`Application::serve`] binds to `host:port` and handles requests until the
///    shutdown future resolves, then closes the database pool
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance over the configured ledger store
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting coin ledger with configuration: {:#?}", config);

        let pool = match &config.database {
            DatabaseConfig::External { url, pool } => {
                info!("Using external database");
                Some(setup_database(url, pool).await?)
            }
            DatabaseConfig::Memory => {
                info!("Using in-memory ledger store; balances are lost on shutdown");
                None
            }
        };

        let store = ledger::create_store(&config.database, pool.clone())?;
        let mut app = Self::new_with_store(config, store)?;
        app.pool = pool;
        Ok(app)
    }

    /// Create an application over an existing store
    pub fn new_with_store(config: Config, store: Arc<dyn LedgerStore>) -> anyhow::Result<Self> {
        let state = AppState::from_store(store, config.clone());
        let router = build_router(&state)?;

        Ok(Self {
            router,
            config,
            pool: None,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Coin ledger listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
