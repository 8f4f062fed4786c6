//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dexsync_core::cache::{BackendStats, CacheBackend, CacheEntry, MemoryCache};
use dexsync_core::{
    DexError, DexSync, ManualClock, NormalizedRecord, Result, SeedBatch, SyncConfig,
    UpstreamSource,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const TYPES: [&str; 4] = ["grass", "fire", "water", "bug"];

/// Deterministic record for an id.
pub fn record(id: u32) -> NormalizedRecord {
    NormalizedRecord {
        id,
        name: format!("mon-{:03}", id),
        height: 3 + id % 20,
        weight: 10 * id,
        base_experience: Some(50 + id),
        types: vec![TYPES[(id as usize) % TYPES.len()].to_string()],
        abilities: vec!["run-away".to_string()],
        stats: BTreeMap::from([("hp".to_string(), 40 + id % 60)]),
        sprites: BTreeMap::from([(
            "front_default".to_string(),
            format!("https://sprites.example/{}.png", id),
        )]),
    }
}

/// In-process upstream. Each fetch optionally advances a manual clock to
/// simulate request latency.
pub struct FakeUpstream {
    clock: Arc<ManualClock>,
    latency: Duration,
    missing: Mutex<HashSet<u32>>,
    renamed: Mutex<HashSet<u32>>,
    calls: AtomicU32,
}

impl FakeUpstream {
    pub fn new(clock: Arc<ManualClock>, latency: Duration) -> Self {
        Self {
            clock,
            latency,
            missing: Mutex::new(HashSet::new()),
            renamed: Mutex::new(HashSet::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Respond 404 for an id.
    pub fn remove(&self, id: u32) {
        self.missing.lock().unwrap().insert(id);
    }

    /// Serve a changed name for an id from now on.
    pub fn rename(&self, id: u32) {
        self.renamed.lock().unwrap().insert(id);
    }
}

#[async_trait]
impl UpstreamSource for FakeUpstream {
    async fn fetch(&self, id: u32) -> Result<NormalizedRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.clock.advance(self.latency);

        if self.missing.lock().unwrap().contains(&id) {
            return Err(DexError::NotFound { id });
        }
        let mut record = record(id);
        if self.renamed.lock().unwrap().contains(&id) {
            record.name = format!("{}-v2", record.name);
        }
        Ok(record)
    }
}

/// Memory cache whose every operation can be made to fail.
pub struct FlakyCache {
    inner: MemoryCache,
    failing: AtomicBool,
    calls: AtomicU32,
}

impl FlakyCache {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            inner: MemoryCache::new(clock),
            failing: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Calls that reached the backend, failed or not.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DexError::Cache {
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

impl CacheBackend for FlakyCache {
    fn kind(&self) -> &'static str {
        "flaky"
    }

    fn ping(&self) -> Result<()> {
        self.check()
    }

    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        self.check()?;
        self.inner.get_entry(namespace, key)
    }

    fn set(&self, namespace: &str, key: &str, value: &[u8], expires_at: DateTime<Utc>) -> Result<()> {
        self.check()?;
        self.inner.set(namespace, key, value, expires_at)
    }

    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.invalidate(namespace, key)
    }

    fn invalidate_namespace(&self, namespace: &str) -> Result<usize> {
        self.check()?;
        self.inner.invalidate_namespace(namespace)
    }

    fn cleanup_expired(&self) -> Result<usize> {
        self.check()?;
        self.inner.cleanup_expired()
    }

    fn get_stats(&self) -> Result<BackendStats> {
        self.check()?;
        self.inner.get_stats()
    }

    fn clear_all(&self) -> Result<usize> {
        self.check()?;
        self.inner.clear_all()
    }
}

/// A DexSync wired to fakes, with its catalog in a temp dir.
pub struct TestEnv {
    pub api: Arc<DexSync>,
    pub clock: Arc<ManualClock>,
    pub upstream: Arc<FakeUpstream>,
    pub cache: Arc<FlakyCache>,
    _temp: TempDir,
}

pub fn test_env(latency: Duration, batches: Vec<SeedBatch>, batch_budget: Duration) -> TestEnv {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let clock = Arc::new(ManualClock::starting_now());
    let upstream = Arc::new(FakeUpstream::new(clock.clone(), latency));
    let cache = Arc::new(FlakyCache::new(clock.clone()));

    let mut config = SyncConfig::default();
    config.database_path = temp.path().join("catalog.sqlite");
    config.cache.url = "memory://".to_string();
    config.seed.batches = batches;
    config.seed.batch_budget_secs = batch_budget.as_secs();
    config.seed.total_budget_secs = batch_budget.as_secs() * 10;

    let api = DexSync::builder(config)
        .with_clock(clock.clone())
        .with_upstream(upstream.clone())
        .with_cache_backend(cache.clone())
        .build()
        .expect("Failed to build DexSync");

    TestEnv {
        api: Arc::new(api),
        clock,
        upstream,
        cache,
        _temp: temp,
    }
}
