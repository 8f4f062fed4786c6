//! Cached read path over the catalog store.

use crate::cache::{namespaces, CacheKey, CacheManager, TtlClass};
use crate::catalog::CatalogStore;
use crate::config::SeedBatch;
use crate::error::Result;
use crate::models::{CatalogQuery, Page, StoredRecord};
use crate::seed::SeedingJob;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A configured batch with how much of it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub label: String,
    pub start: u32,
    pub end: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    /// Records in `start..=end` currently stored.
    pub stored: u64,
    /// Size of the range.
    pub expected: u32,
}

impl GenerationSummary {
    pub fn is_complete(&self) -> bool {
        self.stored >= u64::from(self.expected)
    }
}

/// Store-level counts for admin views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_records: u64,
    pub type_count: usize,
    pub generations: Vec<GenerationSummary>,
}

/// Every catalog read goes through the cache first.
///
/// The store stays authoritative: a cache miss or an unreachable cache falls
/// through to the store and repopulates the cache on the way out. Store errors
/// propagate; cache errors never do.
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    cache: Arc<CacheManager>,
    batches: Vec<SeedBatch>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>, cache: Arc<CacheManager>, batches: Vec<SeedBatch>) -> Self {
        Self {
            store,
            cache,
            batches,
        }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn detail_key(id: u32) -> CacheKey {
        CacheKey::entity(namespaces::POKEMON, id)
    }

    pub fn list_key(query: &CatalogQuery) -> CacheKey {
        CacheKey::query(namespaces::POKEMON_LIST, &query.cache_params())
    }

    pub fn types_key() -> CacheKey {
        CacheKey::entity(namespaces::POKEMON_TYPES, "all")
    }

    /// One record by id. Absent records are not cached, so a later seed is
    /// visible immediately.
    pub fn get_pokemon(&self, id: u32) -> Result<Option<StoredRecord>> {
        let key = Self::detail_key(id);
        if let Some(record) = self.cache.get::<StoredRecord>(&key) {
            return Ok(Some(record));
        }

        let record = self.store.get(id)?;
        if let Some(ref record) = record {
            self.cache.set(&key, record, TtlClass::Detail);
        }
        Ok(record)
    }

    pub fn list_pokemon(&self, query: &CatalogQuery) -> Result<Page<StoredRecord>> {
        let query = query.normalized();
        self.cache
            .get_or_load(&Self::list_key(&query), TtlClass::List, || {
                self.store.list(&query)
            })
    }

    pub fn list_types(&self) -> Result<Vec<String>> {
        self.cache
            .get_or_load(&Self::types_key(), TtlClass::List, || self.store.list_types())
    }

    /// The configured batch table with per-label stored counts.
    ///
    /// Read straight from the store; the counts change while a seed runs.
    pub fn generations(&self) -> Result<Vec<GenerationSummary>> {
        self.batches
            .iter()
            .map(|batch| {
                Ok(GenerationSummary {
                    label: batch.label.clone(),
                    start: batch.start,
                    end: batch.end,
                    region: batch.region.clone(),
                    year: batch.year,
                    stored: self.store.count_in_range(batch.start, batch.end)?,
                    expected: batch.len(),
                })
            })
            .collect()
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        Ok(CatalogStats {
            total_records: self.store.count()?,
            type_count: self.store.list_types()?.len(),
            generations: self.generations()?,
        })
    }

    /// Drop cached views made stale by a seeding run.
    ///
    /// New records only affect listings. Refreshed records may also have
    /// stale detail entries, and the jobs do not say which ids were
    /// refreshed, so the whole detail namespace goes.
    pub fn invalidate_after_seed(&self, jobs: &[SeedingJob]) -> usize {
        let wrote = jobs.iter().any(SeedingJob::wrote_records);
        let refreshed = jobs.iter().any(|job| job.refreshed > 0);

        let mut removed = 0;
        if wrote {
            removed += self.invalidate_listings();
        }
        if refreshed {
            removed += self.cache.delete_namespace(namespaces::POKEMON);
        }
        if removed > 0 {
            debug!("Seeding invalidated {} cache entries", removed);
        }
        removed
    }

    /// Drop the cached views of one record.
    pub fn invalidate_record(&self, id: u32) -> usize {
        usize::from(self.cache.delete(&Self::detail_key(id))) + self.invalidate_listings()
    }

    fn invalidate_listings(&self) -> usize {
        namespaces::LISTINGS
            .iter()
            .map(|ns| self.cache.delete_namespace(ns))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, TtlPolicy};
    use crate::catalog::SqliteCatalog;
    use crate::clock::{Clock, ManualClock};
    use crate::models::NormalizedRecord;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn record(id: u32, name: &str, types: &[&str]) -> NormalizedRecord {
        NormalizedRecord {
            id,
            name: name.to_string(),
            height: 7,
            weight: 69,
            base_experience: Some(64),
            types: types.iter().map(|t| t.to_string()).collect(),
            abilities: vec!["overgrow".to_string()],
            stats: BTreeMap::from([("hp".to_string(), 45)]),
            sprites: BTreeMap::new(),
        }
    }

    fn service() -> (CatalogService, Arc<SqliteCatalog>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(SqliteCatalog::open_in_memory(clock.clone()).unwrap());
        let cache = Arc::new(CacheManager::new(
            Arc::new(MemoryCache::new(clock.clone())),
            TtlPolicy::default(),
            clock.clone(),
        ));
        let batches = vec![SeedBatch::new("first", 1, 3), SeedBatch::new("second", 4, 6)];
        (CatalogService::new(store.clone(), cache, batches), store, clock)
    }

    #[test]
    fn test_detail_served_from_cache_until_expiry() {
        let (service, store, clock) = service();
        store.upsert(&record(1, "bulbasaur", &["grass"])).unwrap();

        let first = service.get_pokemon(1).unwrap().unwrap();
        store.upsert(&record(1, "renamed", &["grass"])).unwrap();

        let cached = service.get_pokemon(1).unwrap().unwrap();
        assert_eq!(cached.record.name, first.record.name);

        clock.advance(Duration::from_secs(3600));
        let fresh = service.get_pokemon(1).unwrap().unwrap();
        assert_eq!(fresh.record.name, "renamed");
    }

    #[test]
    fn test_missing_record_is_not_cached() {
        let (service, store, _clock) = service();
        assert!(service.get_pokemon(2).unwrap().is_none());

        store.upsert(&record(2, "ivysaur", &["grass"])).unwrap();
        assert!(service.get_pokemon(2).unwrap().is_some());
    }

    #[test]
    fn test_list_cache_shared_by_equivalent_queries() {
        let (service, store, _clock) = service();
        store.upsert(&record(1, "bulbasaur", &["grass"])).unwrap();

        let a = service
            .list_pokemon(&CatalogQuery::new().with_search("BULBA"))
            .unwrap();
        assert_eq!(a.total, 1);

        store.upsert(&record(2, "bulbasaur-alt", &["grass"])).unwrap();
        let b = service
            .list_pokemon(&CatalogQuery::new().with_search(" bulba "))
            .unwrap();
        assert_eq!(b.total, 1);
        assert_eq!(service.cache().stats().hits, 1);
    }

    #[test]
    fn test_listing_invalidation_after_seed() {
        let (service, store, clock) = service();
        store.upsert(&record(1, "bulbasaur", &["grass"])).unwrap();
        assert_eq!(service.list_types().unwrap(), vec!["grass"]);

        store.upsert(&record(4, "charmander", &["fire"])).unwrap();
        assert_eq!(service.list_types().unwrap(), vec!["grass"]);

        let now = clock.now();
        let mut job = SeedingJob::start("second", 4, 4, now, now);
        job.record(crate::seed::ItemOutcome::Seeded);
        assert!(service.invalidate_after_seed(&[job]) > 0);
        assert_eq!(service.list_types().unwrap(), vec!["fire", "grass"]);
    }

    #[test]
    fn test_generations_and_stats() {
        let (service, store, _clock) = service();
        for (id, name) in [(1, "bulbasaur"), (2, "ivysaur"), (3, "venusaur"), (4, "charmander")] {
            store.upsert(&record(id, name, &["grass"])).unwrap();
        }

        let generations = service.generations().unwrap();
        assert_eq!(generations[0].stored, 3);
        assert!(generations[0].is_complete());
        assert_eq!(generations[1].stored, 1);
        assert!(!generations[1].is_complete());

        let stats = service.stats().unwrap();
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.type_count, 1);
    }
}
