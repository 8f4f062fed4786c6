//! Sequential batch seeder.

use super::job::{ItemFailure, ItemOutcome, SeedProgress, SeedStatus, SeedingJob};
use crate::catalog::{CatalogStore, UpsertOutcome};
use crate::clock::Clock;
use crate::error::{DexError, Result};
use crate::models::StoredRecord;
use crate::upstream::UpstreamSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Per-run seeding switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedOptions {
    /// Re-fetch and overwrite records that are already stored.
    pub force_refresh: bool,
}

impl SeedOptions {
    pub fn refresh() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

/// Populates the catalog from an upstream source, one identifier at a time.
///
/// Identifiers are processed in ascending order and the deadline is checked
/// before each one, so a run that times out leaves a contiguous prefix of the
/// range decided.
#[derive(Clone)]
pub struct BatchSeeder {
    store: Arc<dyn CatalogStore>,
    source: Arc<dyn UpstreamSource>,
    clock: Arc<dyn Clock>,
}

impl BatchSeeder {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        source: Arc<dyn UpstreamSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            source,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Seed `start..=end` under `label` until done or `deadline` is reached.
    ///
    /// Only an invalid range is an error. Item failures and an expired
    /// deadline are reported through the returned job.
    pub async fn seed(
        &self,
        label: &str,
        start: u32,
        end: u32,
        deadline: DateTime<Utc>,
        options: SeedOptions,
    ) -> Result<SeedingJob> {
        self.seed_with_progress(label, start, end, deadline, options, None)
            .await
    }

    /// Like [`seed`](Self::seed), reporting progress after every identifier.
    pub async fn seed_with_progress(
        &self,
        label: &str,
        start: u32,
        end: u32,
        deadline: DateTime<Utc>,
        options: SeedOptions,
        progress_tx: Option<mpsc::Sender<SeedProgress>>,
    ) -> Result<SeedingJob> {
        if start == 0 {
            return Err(DexError::validation("start", "identifiers start at 1"));
        }
        if start > end {
            return Err(DexError::validation(
                "end",
                format!("range {}..={} is empty", start, end),
            ));
        }

        let mut job = SeedingJob::start(label, start, end, self.clock.now(), deadline);
        info!(
            "Seeding batch '{}' ids {}..={} (job {}, deadline {})",
            label, start, end, job.job_id, deadline
        );

        let mut status = SeedStatus::Completed;
        for id in start..=end {
            if self.clock.now() >= deadline {
                status = SeedStatus::TimedOut;
                break;
            }

            let outcome = process_item(self.store.as_ref(), self.source.as_ref(), id, options).await;
            match &outcome {
                ItemOutcome::Failed(failure) => warn!(
                    "Batch '{}': pokemon {} failed: {}",
                    label, failure.id, failure.reason
                ),
                other => debug!("Batch '{}': pokemon {} {:?}", label, id, other),
            }
            job.record(outcome);

            if let Some(ref tx) = progress_tx {
                let _ = tx.send(SeedProgress::of(&job, Some(id))).await;
            }
        }

        job.finish(status, self.clock.now());
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(SeedProgress::of(&job, None)).await;
        }

        info!(
            "Batch '{}' {}: attempted={} succeeded={} skipped={} failed={} (of {})",
            label,
            job.status,
            job.attempted,
            job.succeeded,
            job.skipped,
            job.failed,
            job.range_len()
        );
        Ok(job)
    }

    /// Re-fetch one stored record and overwrite it.
    ///
    /// Returns `NotFound` when the identifier has never been seeded.
    pub async fn refresh_record(&self, id: u32) -> Result<StoredRecord> {
        if !self.store.contains(id)? {
            return Err(DexError::NotFound { id });
        }

        let record = self.source.fetch(id).await?;
        self.store.upsert(&record)?;
        info!("Refreshed pokemon {} ({})", id, record.name);

        self.store.get(id)?.ok_or(DexError::NotFound { id })
    }
}

/// Decide and apply one identifier.
///
/// Depends only on the identifier, the store's current state and the source,
/// and never fails: every error becomes an [`ItemOutcome::Failed`].
pub async fn process_item(
    store: &dyn CatalogStore,
    source: &dyn UpstreamSource,
    id: u32,
    options: SeedOptions,
) -> ItemOutcome {
    let present = match store.contains(id) {
        Ok(present) => present,
        Err(e) => {
            error!("Catalog lookup for pokemon {} failed: {}", id, e);
            return failed(id, &e);
        }
    };

    if present && !options.force_refresh {
        return ItemOutcome::Skipped;
    }

    let record = match source.fetch(id).await {
        Ok(record) => record,
        Err(e) => return failed(id, &e),
    };

    match store.upsert(&record) {
        Ok(UpsertOutcome::Updated) => ItemOutcome::Refreshed,
        Ok(UpsertOutcome::Inserted) => ItemOutcome::Seeded,
        Err(e) => {
            error!("Catalog write for pokemon {} failed: {}", id, e);
            failed(id, &e)
        }
    }
}

fn failed(id: u32, err: &DexError) -> ItemOutcome {
    ItemOutcome::Failed(ItemFailure {
        id,
        reason: err.to_string(),
        retryable: err.is_retryable(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::clock::{add_duration, ManualClock};
    use crate::models::NormalizedRecord;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Source that serves every id except the listed missing ones.
    struct StubSource {
        missing: HashSet<u32>,
        calls: AtomicU32,
        weight: u32,
    }

    impl StubSource {
        fn new(missing: &[u32]) -> Self {
            Self {
                missing: missing.iter().copied().collect(),
                calls: AtomicU32::new(0),
                weight: 10,
            }
        }
    }

    #[async_trait]
    impl UpstreamSource for StubSource {
        async fn fetch(&self, id: u32) -> Result<NormalizedRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.missing.contains(&id) {
                return Err(DexError::NotFound { id });
            }
            Ok(NormalizedRecord {
                id,
                name: format!("mon-{}", id),
                height: 5,
                weight: self.weight,
                base_experience: None,
                types: vec!["normal".to_string()],
                abilities: vec![],
                stats: BTreeMap::new(),
                sprites: BTreeMap::new(),
            })
        }
    }

    fn seeder_with(source: Arc<StubSource>) -> (BatchSeeder, Arc<SqliteCatalog>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(SqliteCatalog::open_in_memory(clock.clone()).unwrap());
        let seeder = BatchSeeder::new(store.clone(), source, clock.clone());
        (seeder, store, clock)
    }

    fn far(clock: &ManualClock) -> DateTime<Utc> {
        add_duration(clock.now(), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_seed_counts_and_failures() {
        let source = Arc::new(StubSource::new(&[3]));
        let (seeder, store, clock) = seeder_with(source);

        let job = seeder
            .seed("test", 1, 5, far(&clock), SeedOptions::default())
            .await
            .unwrap();

        assert_eq!(job.status, SeedStatus::Completed);
        assert_eq!(job.attempted, 5);
        assert_eq!(job.succeeded, 4);
        assert_eq!(job.failed, 1);
        assert_eq!(job.failures[0].id, 3);
        assert!(!job.failures[0].retryable);
        assert!(job.is_consistent());
        assert_eq!(store.count().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_rerun_skips_without_fetching() {
        let source = Arc::new(StubSource::new(&[]));
        let (seeder, _store, clock) = seeder_with(source.clone());

        seeder
            .seed("test", 1, 4, far(&clock), SeedOptions::default())
            .await
            .unwrap();
        let calls_after_first = source.calls.load(Ordering::SeqCst);

        let second = seeder
            .seed("test", 1, 4, far(&clock), SeedOptions::default())
            .await
            .unwrap();
        assert_eq!(second.skipped, 4);
        assert_eq!(second.succeeded, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_force_refresh_overwrites() {
        let source = Arc::new(StubSource::new(&[]));
        let (seeder, _store, clock) = seeder_with(source);

        seeder
            .seed("test", 1, 3, far(&clock), SeedOptions::default())
            .await
            .unwrap();
        let job = seeder
            .seed("test", 1, 3, far(&clock), SeedOptions::refresh())
            .await
            .unwrap();

        assert_eq!(job.succeeded, 3);
        assert_eq!(job.refreshed, 3);
        assert_eq!(job.skipped, 0);
    }

    #[tokio::test]
    async fn test_expired_deadline_attempts_nothing() {
        let source = Arc::new(StubSource::new(&[]));
        let (seeder, store, clock) = seeder_with(source);

        let job = seeder
            .seed("test", 1, 10, clock.now(), SeedOptions::default())
            .await
            .unwrap();
        assert_eq!(job.status, SeedStatus::TimedOut);
        assert_eq!(job.attempted, 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_range_is_rejected() {
        let source = Arc::new(StubSource::new(&[]));
        let (seeder, _store, clock) = seeder_with(source);

        assert!(seeder
            .seed("test", 5, 4, far(&clock), SeedOptions::default())
            .await
            .is_err());
        assert!(seeder
            .seed("test", 0, 4, far(&clock), SeedOptions::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_progress_reports_each_item() {
        let source = Arc::new(StubSource::new(&[]));
        let (seeder, _store, clock) = seeder_with(source);
        let (tx, mut rx) = mpsc::channel(16);

        seeder
            .seed_with_progress("test", 1, 3, far(&clock), SeedOptions::default(), Some(tx))
            .await
            .unwrap();

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        assert_eq!(updates.len(), 4);
        assert_eq!(updates[0].current_id, Some(1));
        let last = updates.last().unwrap();
        assert_eq!(last.current_id, None);
        assert!((last.progress - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_refresh_record_requires_existing() {
        let source = Arc::new(StubSource::new(&[]));
        let (seeder, _store, clock) = seeder_with(source);

        let err = seeder.refresh_record(7).await.unwrap_err();
        assert!(matches!(err, DexError::NotFound { id: 7 }));

        seeder
            .seed("test", 7, 7, far(&clock), SeedOptions::default())
            .await
            .unwrap();
        clock.advance(Duration::from_secs(5));
        let refreshed = seeder.refresh_record(7).await.unwrap();
        assert!(refreshed.updated_at > refreshed.created_at);
    }
}
