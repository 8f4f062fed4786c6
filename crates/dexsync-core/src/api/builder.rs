//! Builder for configuring DexSync initialization.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::cache::{self, CacheBackend, CacheManager, TtlPolicy};
use crate::catalog::{CatalogStore, SqliteCatalog};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::seed::{BatchSeeder, SeedPlan};
use crate::service::CatalogService;
use crate::upstream::{CachedUpstream, PokeApiClient, UpstreamSource};
use crate::DexSync;
use tracing::info;

/// Builder for [`DexSync`].
///
/// Anything not supplied is created from the configuration. Tests swap in a
/// manual clock, an in-memory cache and a fake upstream here.
pub struct DexSyncBuilder {
    config: SyncConfig,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn CatalogStore>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    upstream: Option<Arc<dyn UpstreamSource>>,
}

impl DexSyncBuilder {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            clock: None,
            store: None,
            cache_backend: None,
            upstream: None,
        }
    }

    /// Time source for TTLs, deadlines and record timestamps.
    ///
    /// Default: [`SystemClock`]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Catalog store. Default: SQLite at `database_path`.
    pub fn with_store(mut self, store: Arc<dyn CatalogStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Cache backend. Default: opened from `cache.url`.
    pub fn with_cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Upstream source. Default: [`PokeApiClient`] built from `upstream`.
    ///
    /// Whatever is supplied is still wrapped in [`CachedUpstream`].
    pub fn with_upstream(mut self, upstream: Arc<dyn UpstreamSource>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Build the DexSync instance.
    ///
    /// Fails on invalid configuration or an unopenable catalog. An
    /// unreachable cache store is not an error.
    pub fn build(self) -> Result<DexSync> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let policy = TtlPolicy::from_config(&config.cache.ttl);

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteCatalog::open(&config.database_path, clock.clone())?),
        };

        let backend = self.cache_backend.unwrap_or_else(|| {
            cache::open_backend(
                &config.cache.url,
                config.busy_timeout(),
                policy.max_ttl(),
                clock.clone(),
            )
        });
        let cache = Arc::new(CacheManager::new(backend, policy, clock.clone()));

        let source: Arc<dyn UpstreamSource> = match self.upstream {
            Some(upstream) => upstream,
            None => Arc::new(PokeApiClient::from_config(&config)?),
        };
        let upstream = Arc::new(CachedUpstream::new(source, cache.clone()));

        let seeder = BatchSeeder::new(store.clone(), upstream.clone(), clock.clone());
        let service = CatalogService::new(store, cache.clone(), config.seed.batches.clone());
        let plan = SeedPlan::from_config(&config.seed);

        info!(
            "dexsync ready: catalog at {}, {} cache, {} seed batches",
            config.database_path.display(),
            cache.backend_kind(),
            plan.batches.len()
        );

        Ok(DexSync {
            config,
            clock,
            cache,
            service,
            seeder,
            upstream,
            plan,
            seed_lock: Arc::new(tokio::sync::Mutex::new(())),
            seeding: Arc::new(AtomicBool::new(false)),
            last_run: std::sync::Mutex::new(None),
        })
    }
}
