//! Bulk import from the upstream source into the catalog.
//!
//! - [`BatchSeeder::seed`]: one labelled range under a deadline
//! - [`BatchSeeder::seed_plan`]: several batches under a shared budget
//! - [`process_item`]: the per-identifier decision, free of batch state

mod job;
mod plan;
mod seeder;

pub use job::{ItemFailure, ItemOutcome, SeedProgress, SeedStatus, SeedingJob};
pub use plan::{BatchSelection, SeedPlan, SeedRunSummary, SeedTotals};
pub use seeder::{process_item, BatchSeeder, SeedOptions};
