//! SQLite-backed storage implementation.

pub(crate) mod change_log;
pub(crate) mod config;
pub(crate) mod dependencies;
pub(crate) mod migrations;
pub mod schema;
pub(crate) mod schemas;
mod store;

pub use store::SqliteStore;

use chrono::{DateTime, Utc};

/// Parses an RFC 3339 timestamp written by this crate, falling back to the
/// Unix epoch on corruption rather than panicking -- a malformed stored
/// timestamp should surface as a wrong date, not crash a read path.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::from_timestamp(0, 0).unwrap())
}
