//! Lookup Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used across all lookup
//! components:
//! - Error types
//! - Reserved record keys and values
//! - ISO-8601 period and timestamp conversion helpers

pub mod error;
pub mod time;

// Re-exports for convenience
pub use error::LookupError;
pub use time::{format_iso_period, parse_iso_period};

/// Reserved record key holding the record type. Always mandatory.
pub const RECORD_TYPE: &str = "type";

/// Reserved record key holding the record's identity for store purposes.
pub const RECORD_URI: &str = "record-uri";

/// Reserved record key holding the time-to-live as an ISO-8601 period string.
pub const RECORD_TTL: &str = "record-ttl";

/// Reserved record key holding the expiry as an ISO-8601 date-time string.
pub const RECORD_EXPIRES: &str = "record-expires";

/// Reserved record key holding the lifecycle state.
pub const RECORD_STATE: &str = "record-state";

/// Lifecycle state values
pub const STATE_REGISTER: &str = "register";
pub const STATE_RENEW: &str = "renew";
pub const STATE_EXPIRE: &str = "expire";
pub const STATE_DELETE: &str = "delete";

/// Query operator values
pub const OPERATOR_ANY: &str = "any";
pub const OPERATOR_ALL: &str = "all";

/// Suffix appended to a field name to carry its match operator in a query
/// (e.g. `record-service-type-operator=any`).
pub const OPERATOR_SUFFIX: &str = "-operator";

/// Grace window added to a queue's creation time before a cache is
/// considered stale by the heartbeat poller.
pub const HEARTBEAT_GRACE_MS: i64 = 120_000;
