use super::{UpstreamMetrics, UpstreamSource};
use crate::cache::{namespaces, CacheKey, CacheManager, TtlClass};
use crate::error::Result;
use crate::models::NormalizedRecord;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Upstream source that remembers fetched records under the `Upstream` TTL
/// class.
///
/// Only successful fetches are cached. The wrapped source stays free of
/// storage side effects.
pub struct CachedUpstream<S> {
    inner: S,
    cache: Arc<CacheManager>,
}

impl<S: UpstreamSource> CachedUpstream<S> {
    pub fn new(inner: S, cache: Arc<CacheManager>) -> Self {
        Self { inner, cache }
    }

    pub fn key(id: u32) -> CacheKey {
        CacheKey::entity(namespaces::UPSTREAM_POKEMON, id)
    }

    /// Forget the mirrored copy of one record.
    pub fn forget(&self, id: u32) -> bool {
        self.cache.delete(&Self::key(id))
    }
}

#[async_trait]
impl<S: UpstreamSource> UpstreamSource for CachedUpstream<S> {
    async fn fetch(&self, id: u32) -> Result<NormalizedRecord> {
        let key = Self::key(id);
        if let Some(record) = self.cache.get::<NormalizedRecord>(&key) {
            debug!("Upstream record {} served from cache", id);
            return Ok(record);
        }

        let record = self.inner.fetch(id).await?;
        self.cache.set(&key, &record, TtlClass::Upstream);
        Ok(record)
    }

    fn metrics(&self) -> Option<UpstreamMetrics> {
        self.inner.metrics()
    }
}
