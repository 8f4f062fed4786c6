//! Catalog read methods on DexSync.

use crate::error::Result;
use crate::models::{CatalogQuery, Page, StoredRecord};
use crate::service::GenerationSummary;
use crate::DexSync;

impl DexSync {
    // ========================================
    // Catalog Reads
    // ========================================

    /// One record by national dex number. `None` if it has not been seeded.
    pub async fn get_pokemon(&self, id: u32) -> Result<Option<StoredRecord>> {
        self.service.get_pokemon(id)
    }

    /// Paginated listing with optional name search and type filter.
    pub async fn list_pokemon(&self, query: &CatalogQuery) -> Result<Page<StoredRecord>> {
        self.service.list_pokemon(query)
    }

    /// Distinct type tags across the catalog, sorted.
    pub async fn list_types(&self) -> Result<Vec<String>> {
        self.service.list_types()
    }

    /// Configured generations with stored counts.
    pub async fn list_generations(&self) -> Result<Vec<GenerationSummary>> {
        self.service.generations()
    }
}
