//! Caching facade used by every read path.

use super::breaker::{BackendBreaker, BreakerConfig, BreakerState, BreakerStats};
use super::codec;
use super::keys::{namespaces, CacheKey};
use super::policy::{TtlClass, TtlPolicy};
use super::traits::{CacheBackend, NamespaceStats};
use crate::clock::{add_duration, Clock};
use crate::error::{DexError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// What to drop from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationScope {
    Key(CacheKey),
    Namespace(String),
    /// Everything derived from the catalog store.
    Catalog,
    /// Mirrored upstream records.
    Upstream,
    All,
}

impl InvalidationScope {
    /// Parse an admin request: `all`, `catalog`, `upstream`,
    /// `namespace` + name, or `key` + `namespace:id`.
    pub fn parse(scope: &str, target: Option<&str>) -> Result<Self> {
        let need_target = |what: &str| {
            target
                .filter(|t| !t.is_empty())
                .ok_or_else(|| DexError::validation("target", format!("scope '{}' needs a {}", scope, what)))
        };

        match scope {
            "all" => Ok(Self::All),
            "catalog" => Ok(Self::Catalog),
            "upstream" => Ok(Self::Upstream),
            "namespace" => Ok(Self::Namespace(need_target("namespace")?.to_string())),
            "key" => {
                let raw = need_target("key")?;
                CacheKey::parse(raw)
                    .map(Self::Key)
                    .ok_or_else(|| DexError::validation("target", format!("'{}' is not namespace:key", raw)))
            }
            other => Err(DexError::validation(
                "scope",
                format!("unknown scope '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Healthy,
    /// Store answers but recent calls failed; some calls are being skipped.
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub status: CacheStatus,
    pub backend: String,
    pub latency_ms: Option<f64>,
    pub breaker_state: BreakerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Counters plus whatever the backend can report about itself.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub backend: String,
    pub status: CacheStatus,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Backend calls that failed.
    pub errors: u64,
    /// Backend calls skipped while the breaker was tripped.
    pub skipped: u64,
    /// Percentage, 0-100.
    pub hit_rate: f64,
    pub total_entries: Option<usize>,
    /// Sum of stored payload sizes.
    pub memory_bytes: Option<u64>,
    pub namespaces: Vec<NamespaceStats>,
    pub ttl_seconds: BTreeMap<String, u64>,
    pub breaker: BreakerStats,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cache facade with graceful degradation.
///
/// No method returns a cache error. Backend failures are logged at `warn`
/// and reported as a miss (reads) or `false`/`0` (writes and deletes). After
/// repeated failures the breaker trips and the backend is skipped entirely
/// until its cooldown passes.
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    policy: TtlPolicy,
    clock: Arc<dyn Clock>,
    breaker: BackendBreaker,
    counters: Counters,
}

impl CacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>, policy: TtlPolicy, clock: Arc<dyn Clock>) -> Self {
        Self::with_breaker(backend, policy, clock, BreakerConfig::default())
    }

    pub fn with_breaker(
        backend: Arc<dyn CacheBackend>,
        policy: TtlPolicy,
        clock: Arc<dyn Clock>,
        breaker: BreakerConfig,
    ) -> Self {
        Self {
            breaker: BackendBreaker::new(backend.kind(), breaker, clock.clone()),
            backend,
            policy,
            clock,
            counters: Counters::default(),
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Run a backend call behind the breaker. `None` means the call
    /// failed or was skipped.
    fn guarded<T>(
        &self,
        op: &str,
        target: &dyn std::fmt::Display,
        call: impl FnOnce(&dyn CacheBackend) -> Result<T>,
    ) -> Option<T> {
        if !self.breaker.allow_call() {
            Counters::bump(&self.counters.skipped);
            debug!("Cache {} skipped for {} (breaker tripped)", op, target);
            return None;
        }

        match call(self.backend.as_ref()) {
            Ok(value) => {
                self.breaker.record_success();
                Some(value)
            }
            Err(e) => {
                self.breaker.record_failure();
                Counters::bump(&self.counters.errors);
                warn!("Cache {} failed for {}: {}", op, target, e);
                None
            }
        }
    }

    /// Look up a value. Missing, expired, undecodable and unreachable all
    /// read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = self
            .guarded("get", key, |b| b.get(key.namespace(), key.key()))
            .flatten();

        let Some(bytes) = bytes else {
            Counters::bump(&self.counters.misses);
            debug!("Cache miss: {}", key);
            return None;
        };

        match codec::decode(&bytes) {
            Ok(value) => {
                Counters::bump(&self.counters.hits);
                debug!("Cache hit: {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Dropping undecodable cache entry {}: {}", key, e);
                Counters::bump(&self.counters.misses);
                self.guarded("delete", key, |b| b.invalidate(key.namespace(), key.key()));
                None
            }
        }
    }

    /// Store a value with the TTL of its class. Returns whether it was written.
    pub fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, class: TtlClass) -> bool {
        let bytes = match codec::encode(value) {
            Ok((bytes, _format)) => bytes,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!("Not caching {}: {}", key, e);
                return false;
            }
        };

        let expires_at = add_duration(self.clock.now(), self.policy.ttl_for(class));
        let written = self
            .guarded("set", key, |b| {
                b.set(key.namespace(), key.key(), &bytes, expires_at)
            })
            .is_some();

        if written {
            Counters::bump(&self.counters.sets);
            debug!("Cached {} ({} bytes, {} ttl)", key, bytes.len(), class);
        }
        written
    }

    /// Cache-aside: return the cached value or compute, cache and return it.
    /// Errors from `load` propagate; cache errors never do.
    pub fn get_or_load<T, F>(&self, key: &CacheKey, class: TtlClass, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let value = load()?;
        self.set(key, &value, class);
        Ok(value)
    }

    pub fn delete(&self, key: &CacheKey) -> bool {
        let removed = self
            .guarded("delete", key, |b| b.invalidate(key.namespace(), key.key()))
            .unwrap_or(false);
        if removed {
            Counters::bump(&self.counters.deletes);
        }
        removed
    }

    pub fn delete_namespace(&self, namespace: &str) -> usize {
        let removed = self
            .guarded("delete_namespace", &namespace, |b| {
                b.invalidate_namespace(namespace)
            })
            .unwrap_or(0);
        self.counters
            .deletes
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear_all(&self) -> usize {
        let removed = self
            .guarded("clear_all", &"*", |b| b.clear_all())
            .unwrap_or(0);
        self.counters
            .deletes
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Apply an invalidation scope. Returns the number of entries removed.
    pub fn invalidate(&self, scope: &InvalidationScope) -> usize {
        let removed = match scope {
            InvalidationScope::Key(key) => usize::from(self.delete(key)),
            InvalidationScope::Namespace(ns) => self.delete_namespace(ns),
            InvalidationScope::Catalog => namespaces::CATALOG
                .iter()
                .map(|ns| self.delete_namespace(ns))
                .sum(),
            InvalidationScope::Upstream => self.delete_namespace(namespaces::UPSTREAM_POKEMON),
            InvalidationScope::All => self.clear_all(),
        };
        debug!("Invalidated {:?}: {} entries", scope, removed);
        removed
    }

    pub fn cleanup_expired(&self) -> usize {
        self.guarded("cleanup_expired", &"*", |b| b.cleanup_expired())
            .unwrap_or(0)
    }

    fn status(&self) -> CacheStatus {
        match self.breaker.state() {
            BreakerState::Closed => CacheStatus::Healthy,
            BreakerState::Trial => CacheStatus::Degraded,
            BreakerState::Tripped => CacheStatus::Unavailable,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let backend_stats = self.guarded("stats", &"*", |b| b.get_stats());

        CacheStats {
            backend: self.backend.kind().to_string(),
            status: self.status(),
            hits,
            misses,
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64 * 100.0
            } else {
                0.0
            },
            total_entries: backend_stats.as_ref().map(|s| s.total_entries),
            memory_bytes: backend_stats.as_ref().map(|s| s.total_size_bytes),
            namespaces: backend_stats.map(|s| s.namespaces).unwrap_or_default(),
            ttl_seconds: self.policy.as_seconds(),
            breaker: self.breaker.stats(),
        }
    }

    /// Ping the backend directly, ignoring the breaker.
    ///
    /// A successful ping during a trial window closes the breaker.
    pub fn health(&self) -> CacheHealth {
        let started = Instant::now();
        let ping = self.backend.ping();
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match ping {
            Ok(()) => {
                if self.breaker.state() == BreakerState::Trial {
                    self.breaker.record_success();
                }
                let status = self.status();
                CacheHealth {
                    status: if status == CacheStatus::Healthy {
                        CacheStatus::Healthy
                    } else {
                        CacheStatus::Degraded
                    },
                    backend: self.backend.kind().to_string(),
                    latency_ms: Some(latency_ms),
                    breaker_state: self.breaker.state(),
                    message: None,
                }
            }
            Err(e) => CacheHealth {
                status: CacheStatus::Unavailable,
                backend: self.backend.kind().to_string(),
                latency_ms: None,
                breaker_state: self.breaker.state(),
                message: Some(e.to_string()),
            },
        }
    }

    /// Zero the hit/miss counters.
    pub fn reset_counters(&self) {
        for counter in [
            &self.counters.hits,
            &self.counters.misses,
            &self.counters.sets,
            &self.counters.deletes,
            &self.counters.errors,
            &self.counters.skipped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
