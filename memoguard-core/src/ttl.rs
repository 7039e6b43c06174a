//! Time-to-live forms accepted by cache writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum lifetime a write must have to reach either tier.
const MIN_TTL_SECS: f64 = 1.0;

/// How long a cached entry should live.
///
/// A ttl that resolves to less than one whole second is treated exactly like an
/// absent ttl: the write is skipped on both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Ttl {
    /// Expires at an absolute instant
    Until(DateTime<Utc>),
    /// Expires after a relative interval
    For(Duration),
    /// Expires after a (possibly fractional) number of minutes
    Minutes(f64),
}

impl Ttl {
    /// Resolve to a store duration measured from now.
    pub fn resolve(&self) -> Option<Duration> {
        self.resolve_at(Utc::now())
    }

    /// Resolve to a store duration measured from `now`.
    ///
    /// Returns `None` for instants in the past, non-positive or non-finite
    /// minute counts, and anything shorter than one second.
    pub fn resolve_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let secs = match self {
            Self::Until(at) => at.signed_duration_since(now).num_milliseconds() as f64 / 1000.0,
            Self::For(interval) => interval.as_secs_f64(),
            Self::Minutes(minutes) => minutes * 60.0,
        };

        if !secs.is_finite() || secs < MIN_TTL_SECS {
            return None;
        }
        Duration::try_from_secs_f64(secs).ok()
    }

    /// Shorthand for a whole number of seconds.
    pub fn seconds(secs: u64) -> Self {
        Self::For(Duration::from_secs(secs))
    }
}

impl From<Duration> for Ttl {
    fn from(interval: Duration) -> Self {
        Self::For(interval)
    }
}

impl From<DateTime<Utc>> for Ttl {
    fn from(at: DateTime<Utc>) -> Self {
        Self::Until(at)
    }
}

/// Resolve an optional ttl; `None` in, `None` out.
pub fn resolve_ttl(ttl: Option<Ttl>) -> Option<Duration> {
    ttl.and_then(|t| t.resolve())
}
