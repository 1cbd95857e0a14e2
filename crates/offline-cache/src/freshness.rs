//! Staleness evaluation

use chrono::{DateTime, Duration, Utc};

use crate::types::StoredEntry;

/// Process-wide TTL: 24 hours
pub const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;

pub fn default_ttl() -> Duration {
    Duration::seconds(DEFAULT_TTL_SECS)
}

/// `true` while less than `ttl` has elapsed since `stored_at`.
///
/// A timestamp in the future (clock skew) counts as fresh.
pub fn is_fresh(now: DateTime<Utc>, stored_at: DateTime<Utc>, ttl: Duration) -> bool {
    now - stored_at < ttl
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    /// No timestamp: seeded at install, served until refetched or purged
    Exempt,
}

impl Freshness {
    pub fn of(entry: &StoredEntry, now: DateTime<Utc>, ttl: Duration) -> Self {
        match entry.stored_at {
            None => Freshness::Exempt,
            Some(stored_at) if is_fresh(now, stored_at, ttl) => Freshness::Fresh,
            Some(_) => Freshness::Stale,
        }
    }

    pub fn is_servable(&self) -> bool {
        !matches!(self, Freshness::Stale)
    }
}
