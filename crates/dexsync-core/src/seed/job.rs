//! In-memory record of one seeding run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a seeding job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedStatus {
    Running,
    Completed,
    /// The deadline was reached before the whole range was processed.
    TimedOut,
}

impl fmt::Display for SeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SeedStatus::Running => "running",
            SeedStatus::Completed => "completed",
            SeedStatus::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// One identifier that could not be seeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub id: u32,
    pub reason: String,
    /// Whether the last error was transient (worth retrying on a later run).
    pub retryable: bool,
}

/// Decision taken for a single identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Fetched and written.
    Seeded,
    /// Already present and re-fetched because refresh was requested.
    Refreshed,
    /// Already present.
    Skipped,
    Failed(ItemFailure),
}

/// Counts and failures of one batch run.
///
/// `attempted` always equals `succeeded + skipped + failed`; `refreshed` is a
/// subset of `succeeded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedingJob {
    pub job_id: String,
    pub label: String,
    pub range_start: u32,
    pub range_end: u32,
    pub attempted: u32,
    pub succeeded: u32,
    pub refreshed: u32,
    pub skipped: u32,
    pub failed: u32,
    pub failures: Vec<ItemFailure>,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SeedStatus,
}

impl SeedingJob {
    pub fn start(
        label: impl Into<String>,
        range_start: u32,
        range_end: u32,
        started_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            range_start,
            range_end,
            attempted: 0,
            succeeded: 0,
            refreshed: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
            started_at,
            deadline,
            finished_at: None,
            status: SeedStatus::Running,
        }
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        self.attempted += 1;
        match outcome {
            ItemOutcome::Seeded => self.succeeded += 1,
            ItemOutcome::Refreshed => {
                self.succeeded += 1;
                self.refreshed += 1;
            }
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed(failure) => {
                self.failed += 1;
                self.failures.push(failure);
            }
        }
    }

    pub fn finish(&mut self, status: SeedStatus, at: DateTime<Utc>) {
        self.status = status;
        self.finished_at = Some(at);
    }

    /// Size of the target range.
    pub fn range_len(&self) -> u32 {
        if self.range_end < self.range_start {
            0
        } else {
            self.range_end - self.range_start + 1
        }
    }

    /// True when at least one record was written.
    pub fn wrote_records(&self) -> bool {
        self.succeeded > 0
    }

    pub fn is_consistent(&self) -> bool {
        self.attempted == self.succeeded + self.skipped + self.failed
    }
}

/// Progress snapshot emitted while a batch runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedProgress {
    pub label: String,
    pub current_id: Option<u32>,
    pub attempted: u32,
    pub total: u32,
    /// Fraction of the range attempted so far (0.0-1.0).
    pub progress: f32,
}

impl SeedProgress {
    pub(crate) fn of(job: &SeedingJob, current_id: Option<u32>) -> Self {
        let total = job.range_len();
        let progress = if total == 0 {
            1.0
        } else {
            job.attempted as f32 / total as f32
        };
        Self {
            label: job.label.clone(),
            current_id,
            attempted: job.attempted,
            total,
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(id: u32) -> ItemOutcome {
        ItemOutcome::Failed(ItemFailure {
            id,
            reason: "HTTP 404".to_string(),
            retryable: false,
        })
    }

    #[test]
    fn test_record_keeps_counts_consistent() {
        let now = Utc::now();
        let mut job = SeedingJob::start("kanto", 1, 10, now, now);

        job.record(ItemOutcome::Seeded);
        job.record(ItemOutcome::Refreshed);
        job.record(ItemOutcome::Skipped);
        job.record(failure(4));

        assert_eq!(job.attempted, 4);
        assert_eq!(job.succeeded, 2);
        assert_eq!(job.refreshed, 1);
        assert_eq!(job.skipped, 1);
        assert_eq!(job.failed, 1);
        assert_eq!(job.failures[0].id, 4);
        assert!(job.is_consistent());
        assert_eq!(job.status, SeedStatus::Running);
    }

    #[test]
    fn test_range_len_and_progress() {
        let now = Utc::now();
        let mut job = SeedingJob::start("johto", 152, 251, now, now);
        assert_eq!(job.range_len(), 100);

        for _ in 0..25 {
            job.record(ItemOutcome::Skipped);
        }
        let progress = SeedProgress::of(&job, Some(177));
        assert_eq!(progress.total, 100);
        assert!((progress.progress - 0.25).abs() < f32::EPSILON);
        assert!(!job.wrote_records());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SeedStatus::TimedOut).unwrap(),
            "\"timed_out\""
        );
        assert_eq!(SeedStatus::Completed.to_string(), "completed");
    }
}
