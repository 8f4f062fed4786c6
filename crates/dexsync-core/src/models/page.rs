use crate::cache::QueryParams;
use serde::{Deserialize, Serialize};

/// Filter and pagination for catalog listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogQuery {
    pub page: u32,
    pub per_page: u32,
    /// Case-insensitive substring of the name.
    pub search: Option<String>,
    /// Exact type tag the record must carry.
    #[serde(rename = "type")]
    pub type_filter: Option<String>,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: Self::DEFAULT_PER_PAGE,
            search: None,
            type_filter: None,
        }
    }
}

impl CatalogQuery {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_type(mut self, type_filter: impl Into<String>) -> Self {
        self.type_filter = Some(type_filter.into());
        self
    }

    /// Clamp paging and normalize filters.
    ///
    /// Blank filters are dropped, text filters are trimmed and lower-cased, so
    /// equivalent queries compare equal and share a cache key.
    pub fn normalized(&self) -> Self {
        let clean = |value: &Option<String>| {
            value
                .as_deref()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
        };

        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, Self::MAX_PER_PAGE),
            search: clean(&self.search),
            type_filter: clean(&self.type_filter),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    /// Parameter set used to derive this query's cache key.
    pub fn cache_params(&self) -> QueryParams {
        let q = self.normalized();
        QueryParams::new()
            .with("page", q.page)
            .with("per_page", q.per_page)
            .with_opt("search", q.search)
            .with_opt("type", q.type_filter)
    }
}

/// One page of results with pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, per_page: u32, total: u64) -> Self {
        let per_page = per_page.max(1);
        let pages = total.div_ceil(u64::from(per_page)) as u32;
        Self {
            items,
            page,
            per_page,
            total,
            pages,
            has_next: page < pages,
            has_prev: page > 1,
        }
    }
}
