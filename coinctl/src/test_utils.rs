//! Test utilities for HTTP-level tests.

use crate::{Application, config::Config, ledger::memory::InMemoryLedger};
use axum_test::TestServer;
use std::sync::Arc;
use uuid::Uuid;

/// Identity header used by the default test configuration
pub const ACCOUNT_HEADER: &str = "x-account-id";

pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    // Short waits keep conflict-retry tests fast
    config.ledger.conflict_backoff = std::time::Duration::from_millis(1);
    config
}

fn server_for(config: Config, store: Arc<InMemoryLedger>) -> TestServer {
    Application::new_with_store(config, store)
        .expect("Failed to create application")
        .into_test_server()
}

/// Test server over a fresh in-memory store. The store handle can inject faults.
pub fn create_test_app() -> (TestServer, Arc<InMemoryLedger>) {
    let store = Arc::new(InMemoryLedger::new());
    (server_for(create_test_config(), store.clone()), store)
}

/// Test server with one account listed in `auth.admin_accounts`
pub fn create_test_app_with_admin() -> (TestServer, Uuid) {
    let admin = Uuid::new_v4();
    let mut config = create_test_config();
    config.auth.admin_accounts = vec![admin];
    (server_for(config, Arc::new(InMemoryLedger::new())), admin)
}
