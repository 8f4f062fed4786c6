//! Domain types shared across modules.

mod page;
mod record;

pub use page::{CatalogQuery, Page};
pub use record::{NormalizedRecord, StoredRecord};
