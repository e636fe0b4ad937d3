//! Resource kinds and their freshness policy
//!
//! The TTL table is compiled in rather than configured: every deployment
//! must agree on how long a balance or a price may be served before the
//! upstream is asked again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Price quotes are re-fetched after five minutes
pub const PRICE_TTL: Duration = Duration::from_secs(5 * 60);
/// Wallet and loan balances are re-fetched after thirty seconds
pub const BALANCE_TTL: Duration = Duration::from_secs(30);
/// Revenue distribution history is re-fetched after one hour
pub const DISTRIBUTION_HISTORY_TTL: Duration = Duration::from_secs(60 * 60);
/// Lending pool statistics are re-fetched after two minutes
pub const POOL_STATISTICS_TTL: Duration = Duration::from_secs(2 * 60);
/// Token metadata is re-fetched after two minutes
pub const TOKEN_METADATA_TTL: Duration = Duration::from_secs(2 * 60);

/// A price older than this is flagged stale even if nothing newer exists
pub const PRICE_STALE_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);

/// Category of cached resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Price,
    Balance,
    DistributionHistory,
    PoolStatistics,
    TokenMetadata,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Price,
        ResourceKind::Balance,
        ResourceKind::DistributionHistory,
        ResourceKind::PoolStatistics,
        ResourceKind::TokenMetadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Price => "price",
            ResourceKind::Balance => "balance",
            ResourceKind::DistributionHistory => "distribution_history",
            ResourceKind::PoolStatistics => "pool_statistics",
            ResourceKind::TokenMetadata => "token_metadata",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind TTL lookup
#[derive(Debug, Clone, Copy, Default)]
pub struct TtlPolicy;

impl TtlPolicy {
    /// The documented TTL table
    pub fn standard() -> Self {
        Self
    }

    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Price => PRICE_TTL,
            ResourceKind::Balance => BALANCE_TTL,
            ResourceKind::DistributionHistory => DISTRIBUTION_HISTORY_TTL,
            ResourceKind::PoolStatistics => POOL_STATISTICS_TTL,
            ResourceKind::TokenMetadata => TOKEN_METADATA_TTL,
        }
    }
}

/// Age of `at` relative to `now`; timestamps from the future count as age zero
pub fn age(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - at).to_std().unwrap_or(Duration::ZERO)
}

/// True when `at` is older than `threshold`
pub fn is_stale(at: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    age(at, now) > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_standard_ttl_table() {
        let policy = TtlPolicy::standard();
        assert_eq!(policy.ttl_for(ResourceKind::Price), Duration::from_secs(300));
        assert_eq!(policy.ttl_for(ResourceKind::Balance), Duration::from_secs(30));
        assert_eq!(
            policy.ttl_for(ResourceKind::DistributionHistory),
            Duration::from_secs(3600)
        );
        assert_eq!(
            policy.ttl_for(ResourceKind::PoolStatistics),
            Duration::from_secs(120)
        );
        assert_eq!(
            policy.ttl_for(ResourceKind::TokenMetadata),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_stale_threshold_is_one_day() {
        assert_eq!(PRICE_STALE_THRESHOLD, Duration::from_secs(86_400));
    }

    #[test]
    fn test_is_stale() {
        let now = Utc::now();
        assert!(!is_stale(now - ChronoDuration::hours(23), now, PRICE_STALE_THRESHOLD));
        assert!(is_stale(now - ChronoDuration::hours(25), now, PRICE_STALE_THRESHOLD));
        // Clock skew: a timestamp slightly in the future is not stale
        assert!(!is_stale(now + ChronoDuration::seconds(5), now, PRICE_STALE_THRESHOLD));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ResourceKind::Price.to_string(), "price");
        assert_eq!(ResourceKind::PoolStatistics.as_str(), "pool_statistics");
        assert_eq!(ResourceKind::ALL.len(), 5);
    }
}
