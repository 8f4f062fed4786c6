//! API implementation submodules.
//!
//! Each submodule contains `impl DexSync` blocks that extend the public API.
//! The struct definition remains in `lib.rs`.

mod admin;
mod builder;
mod catalog;

pub use admin::SeedPermit;
pub use builder::DexSyncBuilder;
