//! Seeding and cache administration methods on DexSync.

use crate::cache::{CacheHealth, CacheStats, InvalidationScope};
use crate::error::{DexError, Result};
use crate::models::StoredRecord;
use crate::seed::{BatchSelection, SeedOptions, SeedRunSummary};
use crate::service::CatalogStats;
use crate::upstream::{UpstreamMetrics, UpstreamSource};
use crate::DexSync;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::info;

/// Exclusive right to seed or clear the catalog.
///
/// Held for the whole run; dropping it releases the seed lock and clears
/// the flag behind [`DexSync::is_seeding`]. Owned, so it can be moved into a
/// spawned task.
pub struct SeedPermit {
    _guard: OwnedMutexGuard<()>,
    active: Arc<AtomicBool>,
}

impl Drop for SeedPermit {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl DexSync {
    // ========================================
    // Seeding
    // ========================================

    /// Take the seed lock without waiting.
    ///
    /// Fails with `SeedInProgress` while another run or a catalog clear
    /// holds it.
    pub fn try_begin_seed(&self) -> Result<SeedPermit> {
        let guard = self
            .seed_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| DexError::SeedInProgress)?;
        self.seeding.store(true, Ordering::SeqCst);
        Ok(SeedPermit {
            _guard: guard,
            active: self.seeding.clone(),
        })
    }

    /// Seed the selected batches under the configured budgets.
    ///
    /// Only one run at a time; a concurrent call fails with `SeedInProgress`
    /// instead of queueing. Listing caches are invalidated when records were
    /// written.
    pub async fn seed(
        &self,
        selection: &BatchSelection,
        options: SeedOptions,
    ) -> Result<SeedRunSummary> {
        let permit = self.try_begin_seed()?;
        self.seed_with_permit(permit, selection, options).await
    }

    /// Run a seed under a permit taken earlier with [`DexSync::try_begin_seed`].
    pub async fn seed_with_permit(
        &self,
        permit: SeedPermit,
        selection: &BatchSelection,
        options: SeedOptions,
    ) -> Result<SeedRunSummary> {
        let _permit = permit;

        if options.force_refresh {
            // Refreshing must reach the provider, not the upstream mirror.
            self.cache.invalidate(&InvalidationScope::Upstream);
        }

        let summary = self.seeder.seed_plan(&self.plan, selection, options).await?;
        self.service.invalidate_after_seed(&summary.jobs);
        *self
            .last_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(summary.clone());
        Ok(summary)
    }

    /// Seed an explicit range under an ad-hoc label.
    pub async fn seed_range(
        &self,
        label: &str,
        start: u32,
        end: u32,
        options: SeedOptions,
    ) -> Result<SeedRunSummary> {
        let selection = BatchSelection::Range {
            label: label.to_string(),
            start,
            end,
        };
        self.seed(&selection, options).await
    }

    /// Re-fetch one stored record from the provider and overwrite it.
    pub async fn refresh_pokemon(&self, id: u32) -> Result<StoredRecord> {
        self.upstream.forget(id);
        let record = self.seeder.refresh_record(id).await?;
        self.service.invalidate_record(id);
        Ok(record)
    }

    /// Remove one stored record and every cached view of it.
    ///
    /// `NotFound` if it is not stored. A later seed of its range brings it
    /// back.
    pub async fn delete_pokemon(&self, id: u32) -> Result<()> {
        if !self.service.store().delete(id)? {
            return Err(DexError::NotFound { id });
        }
        self.upstream.forget(id);
        let removed = self.service.invalidate_record(id);
        info!("Deleted pokemon {} ({} cache entries dropped)", id, removed);
        Ok(())
    }

    // ========================================
    // Cache Administration
    // ========================================

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_health(&self) -> CacheHealth {
        self.cache.health()
    }

    /// Drop cache entries in scope. Returns how many were removed.
    pub fn cache_clear(&self, scope: &InvalidationScope) -> usize {
        let removed = self.cache.invalidate(scope);
        info!("Cache clear {:?}: {} entries removed", scope, removed);
        removed
    }

    /// Purge expired entries from the backend.
    pub fn cache_cleanup(&self) -> usize {
        self.cache.cleanup_expired()
    }

    pub fn cache_reset_counters(&self) {
        self.cache.reset_counters();
    }

    // ========================================
    // Upstream and Store
    // ========================================

    pub fn upstream_metrics(&self) -> Option<UpstreamMetrics> {
        self.upstream.metrics()
    }

    pub async fn catalog_stats(&self) -> Result<CatalogStats> {
        self.service.stats()
    }

    /// Delete every stored record and every cache entry derived from them.
    ///
    /// Refused while a seed is running.
    pub async fn clear_catalog(&self) -> Result<u64> {
        let _permit = self.try_begin_seed()?;

        let removed = self.service.store().clear()?;
        self.cache.invalidate(&InvalidationScope::Catalog);
        info!("Cleared catalog: {} records removed", removed);
        Ok(removed)
    }
}
