//! Multi-batch seeding under an overall budget.

use super::job::{SeedStatus, SeedingJob};
use super::seeder::{BatchSeeder, SeedOptions};
use crate::clock::add_duration;
use crate::config::{SeedBatch, SeedConfig};
use crate::error::{DexError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Ordered batch table plus the budgets that bound a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPlan {
    pub batches: Vec<SeedBatch>,
    pub per_batch_budget: Duration,
    pub total_budget: Duration,
}

impl SeedPlan {
    pub fn new(batches: Vec<SeedBatch>, per_batch_budget: Duration, total_budget: Duration) -> Self {
        Self {
            batches,
            per_batch_budget,
            total_budget,
        }
    }

    pub fn from_config(config: &SeedConfig) -> Self {
        Self::new(
            config.batches.clone(),
            config.batch_budget(),
            config.total_budget(),
        )
    }

    pub fn batch(&self, label: &str) -> Option<&SeedBatch> {
        self.batches.iter().find(|b| b.label == label)
    }

    /// Batches to run for a selection, in configured order.
    pub fn select(&self, selection: &BatchSelection) -> Result<Vec<SeedBatch>> {
        match selection {
            BatchSelection::All => Ok(self.batches.clone()),
            BatchSelection::Labels(labels) => {
                if let Some(unknown) = labels.iter().find(|l| self.batch(l).is_none()) {
                    return Err(DexError::UnknownBatch {
                        label: unknown.clone(),
                    });
                }
                Ok(self
                    .batches
                    .iter()
                    .filter(|b| labels.contains(&b.label))
                    .cloned()
                    .collect())
            }
            BatchSelection::Range { label, start, end } => {
                Ok(vec![SeedBatch::new(label.clone(), *start, *end)])
            }
        }
    }
}

/// Which batches a seeding request covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum BatchSelection {
    All,
    Labels(Vec<String>),
    /// An ad-hoc range outside the configured table.
    Range { label: String, start: u32, end: u32 },
}

impl BatchSelection {
    pub fn label(label: impl Into<String>) -> Self {
        BatchSelection::Labels(vec![label.into()])
    }
}

/// Counts summed over every job of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedTotals {
    pub attempted: u32,
    pub succeeded: u32,
    pub refreshed: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl SeedTotals {
    fn add(&mut self, job: &SeedingJob) {
        self.attempted += job.attempted;
        self.succeeded += job.succeeded;
        self.refreshed += job.refreshed;
        self.skipped += job.skipped;
        self.failed += job.failed;
    }
}

/// Outcome of a multi-batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRunSummary {
    pub jobs: Vec<SeedingJob>,
    pub completed: Vec<String>,
    pub timed_out: Vec<String>,
    /// Selected labels never started because the overall budget ran out.
    pub unattempted: Vec<String>,
    pub totals: SeedTotals,
    pub budget_exhausted: bool,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SeedRunSummary {
    pub fn wrote_records(&self) -> bool {
        self.totals.succeeded > 0
    }
}

impl BatchSeeder {
    /// Run every selected batch in configured order.
    ///
    /// Each batch gets `min(now + per_batch_budget, overall_deadline)`. A batch
    /// that times out does not stop later ones; reaching the overall deadline
    /// does, and the remaining labels are reported as unattempted.
    pub async fn seed_plan(
        &self,
        plan: &SeedPlan,
        selection: &BatchSelection,
        options: SeedOptions,
    ) -> Result<SeedRunSummary> {
        let batches = plan.select(selection)?;
        let started_at = self.clock().now();
        let overall_deadline = add_duration(started_at, plan.total_budget);

        info!(
            "Seeding {} batch(es), budget {:?} per batch and {:?} overall",
            batches.len(),
            plan.per_batch_budget,
            plan.total_budget
        );

        let mut jobs = Vec::with_capacity(batches.len());
        let mut completed = Vec::new();
        let mut timed_out = Vec::new();
        let mut unattempted = Vec::new();
        let mut totals = SeedTotals::default();
        let mut budget_exhausted = false;

        for batch in batches {
            let now = self.clock().now();
            if budget_exhausted || now >= overall_deadline {
                budget_exhausted = true;
                unattempted.push(batch.label);
                continue;
            }

            let deadline = add_duration(now, plan.per_batch_budget).min(overall_deadline);
            let job = self
                .seed(&batch.label, batch.start, batch.end, deadline, options)
                .await?;

            totals.add(&job);
            match job.status {
                SeedStatus::TimedOut => {
                    warn!(
                        "Batch '{}' timed out after {} of {} ids",
                        job.label,
                        job.attempted,
                        job.range_len()
                    );
                    timed_out.push(job.label.clone());
                }
                _ => completed.push(job.label.clone()),
            }
            jobs.push(job);
        }

        let summary = SeedRunSummary {
            jobs,
            completed,
            timed_out,
            unattempted,
            totals,
            budget_exhausted,
            started_at,
            deadline: overall_deadline,
            finished_at: self.clock().now(),
        };

        info!(
            "Seeding run finished: {} completed, {} timed out, {} unattempted, {} written",
            summary.completed.len(),
            summary.timed_out.len(),
            summary.unattempted.len(),
            summary.totals.succeeded
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogStore, SqliteCatalog};
    use crate::clock::{Clock, ManualClock};
    use crate::models::NormalizedRecord;
    use crate::upstream::UpstreamSource;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Each fetch costs one second of simulated time.
    struct SlowSource {
        clock: Arc<ManualClock>,
    }

    #[async_trait]
    impl UpstreamSource for SlowSource {
        async fn fetch(&self, id: u32) -> Result<NormalizedRecord> {
            self.clock.advance(Duration::from_secs(1));
            Ok(NormalizedRecord {
                id,
                name: format!("mon-{}", id),
                height: 1,
                weight: 1,
                base_experience: None,
                types: vec!["bug".to_string()],
                abilities: vec![],
                stats: BTreeMap::new(),
                sprites: BTreeMap::new(),
            })
        }
    }

    fn setup() -> (BatchSeeder, Arc<SqliteCatalog>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(SqliteCatalog::open_in_memory(clock.clone()).unwrap());
        let source = Arc::new(SlowSource {
            clock: clock.clone(),
        });
        (BatchSeeder::new(store.clone(), source, clock.clone()), store, clock)
    }

    fn plan(per_batch: u64, total: u64) -> SeedPlan {
        SeedPlan::new(
            vec![
                SeedBatch::new("a", 1, 10),
                SeedBatch::new("b", 11, 20),
                SeedBatch::new("c", 21, 30),
            ],
            Duration::from_secs(per_batch),
            Duration::from_secs(total),
        )
    }

    #[tokio::test]
    async fn test_all_batches_within_budget() {
        let (seeder, store, _clock) = setup();

        let summary = seeder
            .seed_plan(&plan(60, 600), &BatchSelection::All, SeedOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.completed, vec!["a", "b", "c"]);
        assert!(summary.timed_out.is_empty());
        assert!(!summary.budget_exhausted);
        assert_eq!(summary.totals.succeeded, 30);
        assert_eq!(store.count().unwrap(), 30);
    }

    #[tokio::test]
    async fn test_batch_timeout_does_not_stop_later_batches() {
        let (seeder, store, _clock) = setup();

        let summary = seeder
            .seed_plan(&plan(5, 600), &BatchSelection::All, SeedOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.timed_out, vec!["a", "b", "c"]);
        assert_eq!(summary.jobs.len(), 3);
        for job in &summary.jobs {
            assert_eq!(job.attempted, 5);
        }
        assert_eq!(store.count().unwrap(), 15);
    }

    #[tokio::test]
    async fn test_overall_budget_leaves_unattempted() {
        let (seeder, _store, clock) = setup();
        let start = clock.now();

        let summary = seeder
            .seed_plan(&plan(60, 15), &BatchSelection::All, SeedOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.completed, vec!["a"]);
        assert_eq!(summary.timed_out, vec!["b"]);
        assert_eq!(summary.unattempted, vec!["c"]);
        assert!(summary.budget_exhausted);
        assert_eq!(summary.totals.attempted, 15);
        assert_eq!(summary.deadline, add_duration(start, Duration::from_secs(15)));
    }

    #[tokio::test]
    async fn test_label_selection_keeps_configured_order() {
        let (seeder, _store, _clock) = setup();

        let selection = BatchSelection::Labels(vec!["c".to_string(), "a".to_string()]);
        let summary = seeder
            .seed_plan(&plan(60, 600), &selection, SeedOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.completed, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_unknown_label_is_an_error() {
        let (seeder, store, _clock) = setup();

        let err = seeder
            .seed_plan(&plan(60, 600), &BatchSelection::label("z"), SeedOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DexError::UnknownBatch { .. }));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_explicit_range() {
        let (seeder, store, _clock) = setup();

        let selection = BatchSelection::Range {
            label: "custom".to_string(),
            start: 100,
            end: 104,
        };
        let summary = seeder
            .seed_plan(&plan(60, 600), &selection, SeedOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.completed, vec!["custom"]);
        assert_eq!(store.count_in_range(100, 104).unwrap(), 5);
    }
}
