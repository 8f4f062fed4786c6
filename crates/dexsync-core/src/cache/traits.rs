//! Cache backend trait and types.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached entry with metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The serialized value.
    pub value: Vec<u8>,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
    /// The entry is never returned at or after this instant.
    pub expires_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Entry count and size for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub entry_count: usize,
    pub total_size_bytes: u64,
}

/// Backend-level statistics across all namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub namespaces: Vec<NamespaceStats>,
}

/// Key-value store with per-entry expiry and namespace isolation.
///
/// Implementations are synchronous (rusqlite, mini-moka) and must treat an
/// entry as absent once `expires_at` has passed according to their clock.
/// Errors mean the store could not be reached; [`super::CacheManager`] turns
/// them into misses.
pub trait CacheBackend: Send + Sync {
    /// Short identifier for logs and stats (`sqlite`, `memory`, `unavailable`).
    fn kind(&self) -> &'static str;

    /// Cheap connectivity check.
    fn ping(&self) -> Result<()>;

    /// Get a live entry, or `None` if missing or expired.
    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>>;

    /// Get a live value.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_entry(namespace, key)
            .map(|entry| entry.map(|e| e.value))
    }

    /// Insert or overwrite an entry.
    fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Delete one key. Returns whether anything was removed.
    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Delete every key in a namespace.
    fn invalidate_namespace(&self, namespace: &str) -> Result<usize>;

    /// Drop entries whose expiry has passed.
    fn cleanup_expired(&self) -> Result<usize>;

    fn get_stats(&self) -> Result<BackendStats>;

    /// Delete everything. Returns the number of entries removed.
    fn clear_all(&self) -> Result<usize>;
}
