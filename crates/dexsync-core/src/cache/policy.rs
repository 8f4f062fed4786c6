//! TTL policy by data class.

use crate::config::{CacheDefaults, TtlConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// How volatile a cached value is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlClass {
    /// Listings, searches and filters. Paging churn makes these short-lived.
    List,
    /// Single-record lookups.
    Detail,
    /// Records mirrored from the upstream provider.
    Upstream,
}

impl TtlClass {
    pub const ALL: [TtlClass; 3] = [TtlClass::List, TtlClass::Detail, TtlClass::Upstream];

    fn default_ttl(self) -> Duration {
        match self {
            TtlClass::List => CacheDefaults::LIST_TTL,
            TtlClass::Detail => CacheDefaults::DETAIL_TTL,
            TtlClass::Upstream => CacheDefaults::UPSTREAM_TTL,
        }
    }
}

impl fmt::Display for TtlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtlClass::List => write!(f, "list"),
            TtlClass::Detail => write!(f, "detail"),
            TtlClass::Upstream => write!(f, "upstream"),
        }
    }
}

/// Table from data class to time-to-live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    table: BTreeMap<TtlClass, Duration>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            table: TtlClass::ALL
                .into_iter()
                .map(|class| (class, class.default_ttl()))
                .collect(),
        }
    }
}

impl TtlPolicy {
    pub fn from_config(config: &TtlConfig) -> Self {
        Self::default()
            .with_ttl(TtlClass::List, Duration::from_secs(config.list_secs))
            .with_ttl(TtlClass::Detail, Duration::from_secs(config.detail_secs))
            .with_ttl(TtlClass::Upstream, Duration::from_secs(config.upstream_secs))
    }

    pub fn with_ttl(mut self, class: TtlClass, ttl: Duration) -> Self {
        self.table.insert(class, ttl);
        self
    }

    pub fn ttl_for(&self, class: TtlClass) -> Duration {
        self.table
            .get(&class)
            .copied()
            .unwrap_or_else(|| class.default_ttl())
    }

    /// Longest TTL in the table.
    pub fn max_ttl(&self) -> Duration {
        self.table.values().copied().max().unwrap_or(Duration::ZERO)
    }

    /// Class name to seconds, for stats output.
    pub fn as_seconds(&self) -> BTreeMap<String, u64> {
        self.table
            .iter()
            .map(|(class, ttl)| (class.to_string(), ttl.as_secs()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ordering() {
        let policy = TtlPolicy::default();
        assert!(policy.ttl_for(TtlClass::List) < policy.ttl_for(TtlClass::Detail));
        assert!(policy.ttl_for(TtlClass::Detail) < policy.ttl_for(TtlClass::Upstream));
        assert_eq!(policy.max_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_from_config_overrides() {
        let config = TtlConfig {
            list_secs: 30,
            detail_secs: 600,
            upstream_secs: 7200,
        };
        let policy = TtlPolicy::from_config(&config);
        assert_eq!(policy.ttl_for(TtlClass::List), Duration::from_secs(30));
        assert_eq!(policy.ttl_for(TtlClass::Detail), Duration::from_secs(600));
        assert_eq!(policy.ttl_for(TtlClass::Upstream), Duration::from_secs(7200));
        assert_eq!(policy.as_seconds().get("list"), Some(&30));
    }
}
