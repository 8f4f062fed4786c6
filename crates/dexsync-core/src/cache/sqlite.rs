//! SQLite-backed cache store.

use super::traits::{BackendStats, CacheBackend, CacheEntry, NamespaceStats};
use crate::clock::Clock;
use crate::config::CacheDefaults;
use crate::error::{DexError, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// SQLite cache backend.
///
/// One table keyed by `(namespace, key)`. Expiry instants are stored as Unix
/// milliseconds and compared against the injected clock in SQL.
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteCache {
    /// Open (or create) a cache database with the default busy timeout.
    pub fn open(db_path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::open_with_timeout(db_path, clock, CacheDefaults::BUSY_TIMEOUT)
    }

    /// Open a cache database, waiting at most `busy_timeout` on a locked file.
    pub fn open_with_timeout(
        db_path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| DexError::Io {
                    message: format!("Failed to create cache directory: {}", e),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| DexError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        Self::from_connection(conn, clock, busy_timeout)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, clock, CacheDefaults::BUSY_TIMEOUT)
    }

    fn from_connection(
        conn: Connection,
        clock: Arc<dyn Clock>,
        busy_timeout: Duration,
    ) -> Result<Self> {
        conn.busy_timeout(busy_timeout)
            .map_err(|e| DexError::Database {
                message: format!("Failed to set busy timeout: {}", e),
                source: Some(e),
            })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| DexError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                cached_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_expires
                ON cache_entries(expires_at);
            "#,
        )
        .map_err(|e| DexError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| DexError::Cache {
            message: format!("Failed to lock cache database: {}", e),
        })
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn cache_err(context: &str, e: rusqlite::Error) -> DexError {
    DexError::Cache {
        message: format!("{}: {}", context, e),
    }
}

impl CacheBackend for SqliteCache {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|e| cache_err("Cache ping failed", e))
    }

    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;

        let row: Option<(Vec<u8>, i64, i64, i64)> = conn
            .query_row(
                r#"
                SELECT value, cached_at, expires_at, size_bytes
                FROM cache_entries
                WHERE namespace = ?1 AND key = ?2 AND expires_at > ?3
                "#,
                params![namespace, key, self.now_millis()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| cache_err("Failed to query cache entry", e))?;

        Ok(row.map(|(value, cached_at, expires_at, size_bytes)| CacheEntry {
            value,
            cached_at: from_millis(cached_at),
            expires_at: from_millis(expires_at),
            size_bytes: size_bytes as u64,
        }))
    }

    fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (namespace, key, value, cached_at, expires_at, size_bytes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                namespace,
                key,
                value,
                self.now_millis(),
                expires_at.timestamp_millis(),
                value.len() as i64
            ],
        )
        .map_err(|e| cache_err("Failed to set cache entry", e))?;

        Ok(())
    }

    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(|e| cache_err("Failed to invalidate cache entry", e))?;
        Ok(deleted > 0)
    }

    fn invalidate_namespace(&self, namespace: &str) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1",
                params![namespace],
            )
            .map_err(|e| cache_err("Failed to invalidate namespace", e))?;

        debug!(
            "Invalidated {} entries from namespace '{}'",
            deleted, namespace
        );
        Ok(deleted)
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![self.now_millis()],
            )
            .map_err(|e| cache_err("Failed to clean up expired entries", e))?;

        if deleted > 0 {
            debug!("Cleaned up {} expired cache entries", deleted);
        }
        Ok(deleted)
    }

    fn get_stats(&self) -> Result<BackendStats> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT namespace, COUNT(*), COALESCE(SUM(size_bytes), 0)
                FROM cache_entries
                WHERE expires_at > ?1
                GROUP BY namespace
                ORDER BY namespace
                "#,
            )
            .map_err(|e| cache_err("Failed to prepare stats query", e))?;

        let namespaces: Vec<NamespaceStats> = stmt
            .query_map(params![self.now_millis()], |row| {
                let count: i64 = row.get(1)?;
                let size: i64 = row.get(2)?;
                Ok(NamespaceStats {
                    namespace: row.get(0)?,
                    entry_count: count as usize,
                    total_size_bytes: size as u64,
                })
            })
            .map_err(|e| cache_err("Failed to query namespace stats", e))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(BackendStats {
            total_entries: namespaces.iter().map(|n| n.entry_count).sum(),
            total_size_bytes: namespaces.iter().map(|n| n.total_size_bytes).sum(),
            namespaces,
        })
    }

    fn clear_all(&self) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM cache_entries", [])
            .map_err(|e| cache_err("Failed to clear cache", e))?;
        debug!("Cleared {} cache entries", deleted);
        Ok(deleted)
    }
}
