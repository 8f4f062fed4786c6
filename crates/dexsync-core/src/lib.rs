//! dexsync core - Pokemon catalog synchronization and caching.
//!
//! This crate keeps a local SQLite catalog of Pokemon seeded from PokeAPI and
//! serves it through a cache layer. It can be used programmatically without
//! any HTTP/RPC layer.
//!
//! - [`upstream`]: one-record-at-a-time client with retry classification
//! - [`seed`]: budgeted, idempotent batch seeding
//! - [`cache`]: deterministic keys, TTL classes, graceful degradation
//!
//! # Example
//!
//! ```rust,ignore
//! use dexsync_core::{BatchSelection, CatalogQuery, DexSync, SeedOptions, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> dexsync_core::Result<()> {
//!     let api = DexSync::new(SyncConfig::load(None)?)?;
//!
//!     let run = api.seed(&BatchSelection::label("generation-1"), SeedOptions::default()).await?;
//!     println!("Seeded {} records", run.totals.succeeded);
//!
//!     let page = api.list_pokemon(&CatalogQuery::new().with_type("fire")).await?;
//!     println!("{} fire types", page.total);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod seed;
pub mod service;
pub mod upstream;

mod api;

// Re-export commonly used types
pub use cache::{
    CacheBackend, CacheHealth, CacheKey, CacheManager, CacheStats, CacheStatus,
    InvalidationScope, TtlClass, TtlPolicy,
};
pub use catalog::{CatalogStore, SqliteCatalog, UpsertOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SeedBatch, SyncConfig};
pub use error::{DexError, Result};
pub use models::{CatalogQuery, NormalizedRecord, Page, StoredRecord};
pub use seed::{
    BatchSeeder, BatchSelection, SeedOptions, SeedPlan, SeedRunSummary, SeedStatus, SeedingJob,
};
pub use service::{CatalogService, CatalogStats, GenerationSummary};
pub use upstream::{CachedUpstream, PokeApiClient, UpstreamMetrics, UpstreamSource};

pub use api::{DexSyncBuilder, SeedPermit};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Main entry point: catalog reads, seeding and cache administration.
///
/// Every collaborator is injected at build time (see [`DexSyncBuilder`]); the
/// defaults are the SQLite catalog, the cache named by `cache.url` and the
/// PokeAPI client wrapped in the upstream cache.
pub struct DexSync {
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    cache: Arc<CacheManager>,
    service: CatalogService,
    seeder: BatchSeeder,
    upstream: Arc<CachedUpstream<Arc<dyn UpstreamSource>>>,
    plan: SeedPlan,
    /// Held for the duration of a seeding run or catalog clear.
    seed_lock: Arc<tokio::sync::Mutex<()>>,
    /// Mirrors `seed_lock` for status reads, which must never contend for it.
    seeding: Arc<AtomicBool>,
    last_run: std::sync::Mutex<Option<SeedRunSummary>>,
}

impl DexSync {
    /// Create a builder for DexSync.
    ///
    /// ```rust,ignore
    /// let api = DexSync::builder(config)
    ///     .with_cache_backend(Arc::new(MemoryCache::new(clock.clone())))
    ///     .with_clock(clock)
    ///     .build()?;
    /// ```
    pub fn builder(config: SyncConfig) -> DexSyncBuilder {
        DexSyncBuilder::new(config)
    }

    /// Create an instance with all default collaborators.
    pub fn new(config: SyncConfig) -> Result<Self> {
        DexSyncBuilder::new(config).build()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.service
    }

    pub fn seeder(&self) -> &BatchSeeder {
        &self.seeder
    }

    pub fn plan(&self) -> &SeedPlan {
        &self.plan
    }

    /// True while a seeding run or catalog clear holds the seed lock.
    pub fn is_seeding(&self) -> bool {
        self.seeding.load(Ordering::SeqCst)
    }

    /// Summary of the most recent seeding run that got past validation.
    pub fn last_seed_run(&self) -> Option<SeedRunSummary> {
        self.last_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
