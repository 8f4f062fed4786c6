//! Persistent catalog store.
//!
//! The store is authoritative: cache entries are derived from it and the
//! seeder writes into it.

mod sqlite;

pub use sqlite::SqliteCatalog;

use crate::error::Result;
use crate::models::{CatalogQuery, NormalizedRecord, Page, StoredRecord};
use serde::{Deserialize, Serialize};

/// Result of an upsert-by-identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Relational storage for catalog records.
///
/// Synchronous, like rusqlite. Implementations must be safe to share across
/// threads.
pub trait CatalogStore: Send + Sync {
    fn contains(&self, id: u32) -> Result<bool>;

    fn get(&self, id: u32) -> Result<Option<StoredRecord>>;

    /// Insert, or replace every field of an existing record with the same id.
    fn upsert(&self, record: &NormalizedRecord) -> Result<UpsertOutcome>;

    /// Filtered, paginated listing ordered by id.
    fn list(&self, query: &CatalogQuery) -> Result<Page<StoredRecord>>;

    /// Distinct type tags, sorted.
    fn list_types(&self) -> Result<Vec<String>>;

    fn count(&self) -> Result<u64>;

    /// Number of stored ids in `start..=end`.
    fn count_in_range(&self, start: u32, end: u32) -> Result<u64>;

    fn delete(&self, id: u32) -> Result<bool>;

    /// Remove every record. Returns how many were removed.
    fn clear(&self) -> Result<u64>;
}
