//! Cache backend that refuses every call, used when no store can be opened.

use super::traits::{BackendStats, CacheBackend, CacheEntry};
use crate::error::{DexError, Result};
use chrono::{DateTime, Utc};

/// Stand-in for a cache store that could not be opened or was disabled.
///
/// Every call fails, so the manager reports the cache as down and the read
/// path falls through to the catalog store.
#[derive(Debug, Clone)]
pub struct UnavailableCache {
    reason: String,
}

impl UnavailableCache {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn fail<T>(&self) -> Result<T> {
        Err(DexError::Cache {
            message: format!("cache unavailable: {}", self.reason),
        })
    }
}

impl CacheBackend for UnavailableCache {
    fn kind(&self) -> &'static str {
        "unavailable"
    }

    fn ping(&self) -> Result<()> {
        self.fail()
    }

    fn get_entry(&self, _namespace: &str, _key: &str) -> Result<Option<CacheEntry>> {
        self.fail()
    }

    fn set(
        &self,
        _namespace: &str,
        _key: &str,
        _value: &[u8],
        _expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.fail()
    }

    fn invalidate(&self, _namespace: &str, _key: &str) -> Result<bool> {
        self.fail()
    }

    fn invalidate_namespace(&self, _namespace: &str) -> Result<usize> {
        self.fail()
    }

    fn cleanup_expired(&self) -> Result<usize> {
        self.fail()
    }

    fn get_stats(&self) -> Result<BackendStats> {
        self.fail()
    }

    fn clear_all(&self) -> Result<usize> {
        self.fail()
    }
}
