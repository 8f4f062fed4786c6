//! Configuration for dexsync.
//!
//! Defaults live in the const-holding structs below. [`SyncConfig`] layers an
//! optional JSON file and then environment variables on top of them.

use crate::error::{DexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Upstream (PokeAPI) defaults.
pub struct UpstreamDefaults;

impl UpstreamDefaults {
    pub const BASE_URL: &'static str = "https://pokeapi.co/api/v2";
    pub const USER_AGENT: &'static str = "dexsync/0.1";
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);
}

/// Cache defaults.
pub struct CacheDefaults;

impl CacheDefaults {
    pub const LIST_TTL: Duration = Duration::from_secs(300);
    pub const DETAIL_TTL: Duration = Duration::from_secs(3600);
    pub const UPSTREAM_TTL: Duration = Duration::from_secs(86_400);
    /// Keeps a locked cache file from stalling the read path.
    pub const BUSY_TIMEOUT: Duration = Duration::from_millis(250);
    pub const MEMORY_MAX_ENTRIES: u64 = 10_000;
    pub const BREAKER_TRIP_AFTER: u32 = 3;
    pub const BREAKER_COOLDOWN: Duration = Duration::from_secs(30);
}

/// Seeding defaults.
pub struct SeedDefaults;

impl SeedDefaults {
    pub const BATCH_BUDGET: Duration = Duration::from_secs(600);
    pub const TOTAL_BUDGET: Duration = Duration::from_secs(1800);
}

/// Path defaults.
pub struct PathsConfig;

impl PathsConfig {
    pub const DATA_DIR_NAME: &'static str = "dexsync";
    pub const CATALOG_DB_NAME: &'static str = "catalog.sqlite";
    pub const CACHE_DB_NAME: &'static str = "cache.sqlite";

    /// Platform data directory for dexsync, falling back to the working directory.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::DATA_DIR_NAME)
    }
}

/// A labelled, contiguous identifier range seeded as one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedBatch {
    pub label: String,
    pub start: u32,
    pub end: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

impl SeedBatch {
    pub fn new(label: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            label: label.into(),
            start,
            end,
            region: None,
            year: None,
        }
    }

    fn generation(label: &str, region: &str, year: u16, start: u32, end: u32) -> Self {
        Self {
            label: label.to_string(),
            start,
            end,
            region: Some(region.to_string()),
            year: Some(year),
        }
    }

    /// Number of identifiers in the batch.
    pub fn len(&self) -> u32 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first five generations, in release order.
    pub fn default_generations() -> Vec<SeedBatch> {
        vec![
            Self::generation("generation-1", "Kanto", 1996, 1, 151),
            Self::generation("generation-2", "Johto", 1999, 152, 251),
            Self::generation("generation-3", "Hoenn", 2002, 252, 386),
            Self::generation("generation-4", "Sinnoh", 2006, 387, 493),
            Self::generation("generation-5", "Unova", 2010, 494, 649),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub min_request_interval_ms: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: UpstreamDefaults::BASE_URL.to_string(),
            request_timeout_secs: UpstreamDefaults::REQUEST_TIMEOUT.as_secs(),
            min_request_interval_ms: UpstreamDefaults::MIN_REQUEST_INTERVAL.as_millis() as u64,
            max_attempts: UpstreamDefaults::MAX_ATTEMPTS,
            retry_base_delay_ms: UpstreamDefaults::RETRY_BASE_DELAY.as_millis() as u64,
        }
    }
}

/// Per-class TTL overrides, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    pub list_secs: u64,
    pub detail_secs: u64,
    pub upstream_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            list_secs: CacheDefaults::LIST_TTL.as_secs(),
            detail_secs: CacheDefaults::DETAIL_TTL.as_secs(),
            upstream_secs: CacheDefaults::UPSTREAM_TTL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// `sqlite://<path>`, `memory://` or `none`.
    pub url: String,
    pub ttl: TtlConfig,
    pub busy_timeout_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            url: format!(
                "sqlite://{}",
                PathsConfig::data_dir()
                    .join(PathsConfig::CACHE_DB_NAME)
                    .display()
            ),
            ttl: TtlConfig::default(),
            busy_timeout_ms: CacheDefaults::BUSY_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub batch_budget_secs: u64,
    pub total_budget_secs: u64,
    pub batches: Vec<SeedBatch>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            batch_budget_secs: SeedDefaults::BATCH_BUDGET.as_secs(),
            total_budget_secs: SeedDefaults::TOTAL_BUDGET.as_secs(),
            batches: SeedBatch::default_generations(),
        }
    }
}

impl SeedConfig {
    pub fn batch_budget(&self) -> Duration {
        Duration::from_secs(self.batch_budget_secs)
    }

    pub fn total_budget(&self) -> Duration {
        Duration::from_secs(self.total_budget_secs)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub upstream: UpstreamConfig,
    pub database_path: PathBuf,
    pub cache: CacheSettings,
    pub seed: SeedConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            database_path: PathsConfig::data_dir().join(PathsConfig::CATALOG_DB_NAME),
            cache: CacheSettings::default(),
            seed: SeedConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from an optional JSON file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| DexError::io_with_path(e, path))?;
        serde_json::from_str(&content).map_err(|e| DexError::Config {
            message: format!("Invalid config file {}: {}", path.display(), e),
        })
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("POKEAPI_BASE_URL") {
            self.upstream.base_url = url;
        }
        if let Some(path) = lookup("DEXSYNC_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("DEXSYNC_CACHE_URL") {
            self.cache.url = url;
        }

        let numeric: [(&str, &mut u64); 8] = [
            (
                "DEXSYNC_UPSTREAM_TIMEOUT_SECS",
                &mut self.upstream.request_timeout_secs,
            ),
            (
                "DEXSYNC_UPSTREAM_INTERVAL_MS",
                &mut self.upstream.min_request_interval_ms,
            ),
            (
                "DEXSYNC_UPSTREAM_RETRY_DELAY_MS",
                &mut self.upstream.retry_base_delay_ms,
            ),
            ("DEXSYNC_TTL_LIST_SECS", &mut self.cache.ttl.list_secs),
            ("DEXSYNC_TTL_DETAIL_SECS", &mut self.cache.ttl.detail_secs),
            ("DEXSYNC_TTL_UPSTREAM_SECS", &mut self.cache.ttl.upstream_secs),
            (
                "DEXSYNC_SEED_BATCH_BUDGET_SECS",
                &mut self.seed.batch_budget_secs,
            ),
            (
                "DEXSYNC_SEED_TOTAL_BUDGET_SECS",
                &mut self.seed.total_budget_secs,
            ),
        ];
        for (key, slot) in numeric {
            if let Some(raw) = lookup(key) {
                *slot = parse_number(key, &raw)?;
            }
        }

        if let Some(raw) = lookup("DEXSYNC_UPSTREAM_MAX_ATTEMPTS") {
            self.upstream.max_attempts = parse_number("DEXSYNC_UPSTREAM_MAX_ATTEMPTS", &raw)?;
        }

        debug!("Configuration after overrides: {:?}", self);
        Ok(())
    }

    /// Check invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.upstream.base_url).map_err(|e| {
            DexError::validation("upstream.base_url", format!("not a valid URL: {}", e))
        })?;

        for (field, value) in [
            ("upstream.request_timeout_secs", self.upstream.request_timeout_secs),
            ("seed.batch_budget_secs", self.seed.batch_budget_secs),
            ("seed.total_budget_secs", self.seed.total_budget_secs),
        ] {
            if value == 0 {
                return Err(DexError::validation(field, "must be greater than zero"));
            }
        }

        if self.upstream.max_attempts == 0 {
            return Err(DexError::validation(
                "upstream.max_attempts",
                "must be at least 1",
            ));
        }

        let mut seen = HashSet::new();
        for batch in &self.seed.batches {
            if batch.start == 0 || batch.start > batch.end {
                return Err(DexError::validation(
                    "seed.batches",
                    format!(
                        "batch '{}' has invalid range {}..={}",
                        batch.label, batch.start, batch.end
                    ),
                ));
            }
            if !seen.insert(batch.label.as_str()) {
                return Err(DexError::validation(
                    "seed.batches",
                    format!("duplicate batch label '{}'", batch.label),
                ));
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.request_timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.upstream.min_request_interval_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.cache.busy_timeout_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| DexError::Config {
        message: format!("{} must be a non-negative integer, got '{}'", key, raw),
    })
}
