//! Cache layer in front of the catalog read paths.
//!
//! - [`CacheBackend`]: swappable store (SQLite file, in-memory, or a stand-in
//!   for an unreachable store)
//! - [`CacheManager`]: typed get/set, TTL policy by data class, stats, and
//!   graceful degradation behind a [`BackendBreaker`]
//! - [`CacheKey`] / [`QueryParams`]: deterministic key derivation

mod breaker;
mod codec;
mod keys;
mod manager;
mod memory;
mod policy;
mod sqlite;
mod traits;
mod unavailable;

pub use breaker::{BackendBreaker, BreakerConfig, BreakerState, BreakerStats};
pub use codec::{decode, encode, Format};
pub use keys::{namespaces, CacheKey, QueryParams};
pub use manager::{CacheHealth, CacheManager, CacheStats, CacheStatus, InvalidationScope};
pub use memory::MemoryCache;
pub use policy::{TtlClass, TtlPolicy};
pub use sqlite::SqliteCache;
pub use traits::{BackendStats, CacheBackend, CacheEntry, NamespaceStats};
pub use unavailable::UnavailableCache;

use crate::clock::Clock;
use crate::config::CacheDefaults;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Open the backend named by a connection string.
///
/// Accepts `sqlite://<path>`, `memory://` and `none`. Never fails: a store
/// that cannot be opened, or an unsupported scheme, yields an
/// [`UnavailableCache`] and a warning, so startup continues without a cache.
pub fn open_backend(
    url: &str,
    busy_timeout: Duration,
    ttl_ceiling: Duration,
    clock: Arc<dyn Clock>,
) -> Arc<dyn CacheBackend> {
    let url = url.trim();

    if url.is_empty() || url.eq_ignore_ascii_case("none") {
        info!("Cache disabled by configuration");
        return Arc::new(UnavailableCache::new("disabled"));
    }

    if url.starts_with("memory://") {
        info!("Using in-memory cache");
        return Arc::new(MemoryCache::with_capacity(
            CacheDefaults::MEMORY_MAX_ENTRIES,
            ttl_ceiling,
            clock,
        ));
    }

    if let Some(path) = url.strip_prefix("sqlite://") {
        return match SqliteCache::open_with_timeout(path, clock, busy_timeout) {
            Ok(cache) => {
                info!("Using SQLite cache at {}", path);
                Arc::new(cache)
            }
            Err(e) => {
                warn!("Cache store at {} is unavailable, continuing without cache: {}", path, e);
                Arc::new(UnavailableCache::new(e.to_string()))
            }
        };
    }

    let scheme = url.split("://").next().unwrap_or(url);
    warn!("Unsupported cache scheme '{}', continuing without cache", scheme);
    Arc::new(UnavailableCache::new(format!("unsupported scheme '{}'", scheme)))
}
