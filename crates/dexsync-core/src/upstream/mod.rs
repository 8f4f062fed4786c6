//! Upstream data sources.
//!
//! [`UpstreamSource`] is the seam the seeder depends on. [`PokeApiClient`] is
//! the HTTP implementation; [`CachedUpstream`] wraps any source with the
//! long-lived upstream cache class.

mod cached;
mod payload;
mod pokeapi;

pub use cached::CachedUpstream;
pub use payload::{AbilitySlot, NamedResource, PokemonPayload, StatEntry, TypeSlot};
pub use pokeapi::{PokeApiClient, UpstreamMetrics};

use crate::error::Result;
use crate::models::NormalizedRecord;
use async_trait::async_trait;

/// Fetches one record at a time from the provider.
///
/// Errors are classified by [`crate::DexError::is_retryable`]: transient
/// failures have already been retried by the time they reach the caller.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    async fn fetch(&self, id: u32) -> Result<NormalizedRecord>;

    /// Request metrics, if the source keeps any.
    fn metrics(&self) -> Option<UpstreamMetrics> {
        None
    }
}

#[async_trait]
impl<S: UpstreamSource + ?Sized> UpstreamSource for std::sync::Arc<S> {
    async fn fetch(&self, id: u32) -> Result<NormalizedRecord> {
        (**self).fetch(id).await
    }

    fn metrics(&self) -> Option<UpstreamMetrics> {
        (**self).metrics()
    }
}
