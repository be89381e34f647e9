//! Common type definitions.
//!
//! # ID Types
//!
//! Entity IDs are UUIDs wrapped in type aliases, matching the rows in the ledger schema:
//!
//! - [`AccountId`]: Authenticated identity that owns one coin balance
//! - [`RewardId`]: Catalog entry that can be redeemed for coins
//! - [`UserRewardId`]: Record of one completed redemption
//! - [`TransactionId`]: Entry in the append-only coin transaction log
//!
//! Product references point into the storefront catalog, which keys products by integer.
//!
//! # Request IDs
//!
//! [`RequestId`] is the caller-supplied idempotency key for redemptions. It is opaque text,
//! scoped to one account.
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type AccountId = Uuid;
pub type RewardId = Uuid;
pub type UserRewardId = Uuid;
pub type TransactionId = Uuid;
pub type ProductId = i64;

/// Maximum accepted length for an idempotency key
pub const MAX_REQUEST_ID_LEN: usize = 128;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Idempotency key attached to a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Parse a caller-supplied key. Returns `None` for empty or oversized keys.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_REQUEST_ID_LEN {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Fresh random key, used by clients that don't bring their own
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
