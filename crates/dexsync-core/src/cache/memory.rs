//! In-process cache store on top of mini-moka.

use super::traits::{BackendStats, CacheBackend, CacheEntry, NamespaceStats};
use crate::clock::Clock;
use crate::config::CacheDefaults;
use crate::error::Result;
use chrono::{DateTime, Utc};
use mini_moka::sync::Cache;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

type EntryKey = (String, String);

/// Bounded in-memory cache backend.
///
/// mini-moka evicts by capacity and by a global time-to-live ceiling. The
/// per-entry expiry is checked against the injected clock on every read.
pub struct MemoryCache {
    entries: Cache<EntryKey, Arc<CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(
            CacheDefaults::MEMORY_MAX_ENTRIES,
            CacheDefaults::UPSTREAM_TTL,
            clock,
        )
    }

    /// `ttl_ceiling` should be at least the longest TTL class in use.
    pub fn with_capacity(max_entries: u64, ttl_ceiling: Duration, clock: Arc<dyn Clock>) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl_ceiling)
            .build();
        Self { entries, clock }
    }

    fn is_live(&self, entry: &CacheEntry) -> bool {
        entry.expires_at > self.clock.now()
    }

    fn keys_where(&self, keep: impl Fn(&EntryKey, &CacheEntry) -> bool) -> Vec<EntryKey> {
        self.entries
            .iter()
            .filter(|e| keep(e.key(), e.value()))
            .map(|e| e.key().clone())
            .collect()
    }
}

impl CacheBackend for MemoryCache {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        let lookup = (namespace.to_string(), key.to_string());
        match self.entries.get(&lookup) {
            Some(entry) if self.is_live(&entry) => Ok(Some(entry.as_ref().clone())),
            Some(_) => {
                self.entries.invalidate(&lookup);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = CacheEntry {
            value: value.to_vec(),
            cached_at: self.clock.now(),
            expires_at,
            size_bytes: value.len() as u64,
        };
        self.entries
            .insert((namespace.to_string(), key.to_string()), Arc::new(entry));
        Ok(())
    }

    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        let lookup = (namespace.to_string(), key.to_string());
        let existed = self.entries.contains_key(&lookup);
        self.entries.invalidate(&lookup);
        Ok(existed)
    }

    fn invalidate_namespace(&self, namespace: &str) -> Result<usize> {
        let keys = self.keys_where(|(ns, _), _| ns == namespace);
        for key in &keys {
            self.entries.invalidate(key);
        }
        Ok(keys.len())
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let keys = self.keys_where(|_, entry| entry.expires_at <= now);
        for key in &keys {
            self.entries.invalidate(key);
        }
        Ok(keys.len())
    }

    fn get_stats(&self) -> Result<BackendStats> {
        let now = self.clock.now();
        let mut per_ns: BTreeMap<String, (usize, u64)> = BTreeMap::new();
        for entry in self.entries.iter() {
            if entry.value().expires_at <= now {
                continue;
            }
            let slot = per_ns.entry(entry.key().0.clone()).or_default();
            slot.0 += 1;
            slot.1 += entry.value().size_bytes;
        }

        let namespaces: Vec<NamespaceStats> = per_ns
            .into_iter()
            .map(|(namespace, (entry_count, total_size_bytes))| NamespaceStats {
                namespace,
                entry_count,
                total_size_bytes,
            })
            .collect();

        Ok(BackendStats {
            total_entries: namespaces.iter().map(|n| n.entry_count).sum(),
            total_size_bytes: namespaces.iter().map(|n| n.total_size_bytes).sum(),
            namespaces,
        })
    }

    fn clear_all(&self) -> Result<usize> {
        let count = self.entries.iter().count();
        self.entries.invalidate_all();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{add_duration, ManualClock};

    #[test]
    fn test_round_trip_and_expiry() {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = MemoryCache::new(clock.clone());

        let expires = add_duration(clock.now(), Duration::from_secs(300));
        cache.set("pokemon_list", "abc", b"page-1", expires).unwrap();
        assert_eq!(
            cache.get("pokemon_list", "abc").unwrap(),
            Some(b"page-1".to_vec())
        );

        clock.advance(Duration::from_secs(300));
        assert_eq!(cache.get("pokemon_list", "abc").unwrap(), None);
    }

    #[test]
    fn test_namespace_isolation() {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = MemoryCache::new(clock.clone());
        let expires = add_duration(clock.now(), Duration::from_secs(60));

        cache.set("pokemon", "1", b"a", expires).unwrap();
        cache.set("pokemon", "2", b"b", expires).unwrap();
        cache.set("pokeapi_pokemon", "1", b"c", expires).unwrap();

        assert_eq!(cache.invalidate_namespace("pokemon").unwrap(), 2);
        assert!(cache.get("pokemon", "1").unwrap().is_none());
        assert!(cache.get("pokeapi_pokemon", "1").unwrap().is_some());

        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_size_bytes, 1);
    }
}
