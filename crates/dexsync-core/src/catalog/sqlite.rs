//! SQLite catalog store.

use super::{CatalogStore, UpsertOutcome};
use crate::clock::Clock;
use crate::error::{DexError, Result};
use crate::models::{CatalogQuery, NormalizedRecord, Page, StoredRecord};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const COLUMNS: &str = "id, name, height, weight, base_experience, types_json, \
                       abilities_json, stats_json, sprites_json, created_at, updated_at";

/// Catalog backed by a single SQLite table.
///
/// List fields are stored as JSON text; type membership is filtered with
/// `json_each`.
pub struct SqliteCatalog {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteCatalog {
    /// Create or open a catalog at the given path.
    pub fn open(db_path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| DexError::Io {
                    message: format!("Failed to create directory {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            db_path: Some(db_path),
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Private in-memory catalog.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            db_path: None,
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=30000;
            PRAGMA synchronous=NORMAL;
            ",
        )?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS pokemon (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                name_lower TEXT NOT NULL,
                height INTEGER NOT NULL,
                weight INTEGER NOT NULL,
                base_experience INTEGER,
                types_json TEXT NOT NULL,
                abilities_json TEXT NOT NULL,
                stats_json TEXT NOT NULL,
                sprites_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pokemon_name ON pokemon(name_lower);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DexError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<StoredRecord> {
        let created_at: i64 = row.get(9)?;
        let updated_at: i64 = row.get(10)?;

        Ok(StoredRecord {
            record: NormalizedRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                height: row.get(2)?,
                weight: row.get(3)?,
                base_experience: row.get(4)?,
                types: json_column(row, 5)?,
                abilities: json_column(row, 6)?,
                stats: json_column(row, 7)?,
                sprites: json_column(row, 8)?,
            },
            created_at: from_millis(created_at),
            updated_at: from_millis(updated_at),
        })
    }
}

/// Decode a JSON text column. A value that does not parse fails the row.
fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Escape `LIKE` wildcards so user text matches literally.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl CatalogStore for SqliteCatalog {
    fn contains(&self, id: u32) -> Result<bool> {
        let conn = self.lock()?;
        let found = conn
            .query_row("SELECT 1 FROM pokemon WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn get(&self, id: u32) -> Result<Option<StoredRecord>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM pokemon WHERE id = ?1", COLUMNS);
        let record = conn
            .query_row(&sql, params![id], Self::row_to_record)
            .optional()?;
        Ok(record)
    }

    fn upsert(&self, record: &NormalizedRecord) -> Result<UpsertOutcome> {
        let types_json = serde_json::to_string(&record.types)?;
        let abilities_json = serde_json::to_string(&record.abilities)?;
        let stats_json = serde_json::to_string(&record.stats)?;
        let sprites_json = serde_json::to_string(&record.sprites)?;
        let now = self.clock.now().timestamp_millis();

        let conn = self.lock()?;
        let existed = conn
            .query_row("SELECT 1 FROM pokemon WHERE id = ?1", params![record.id], |_| Ok(()))
            .optional()?
            .is_some();

        conn.execute(
            "INSERT INTO pokemon (id, name, name_lower, height, weight, base_experience,
                                  types_json, abilities_json, stats_json, sprites_json,
                                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
             ON CONFLICT(id) DO UPDATE SET
                 name=excluded.name,
                 name_lower=excluded.name_lower,
                 height=excluded.height,
                 weight=excluded.weight,
                 base_experience=excluded.base_experience,
                 types_json=excluded.types_json,
                 abilities_json=excluded.abilities_json,
                 stats_json=excluded.stats_json,
                 sprites_json=excluded.sprites_json,
                 updated_at=excluded.updated_at",
            params![
                record.id,
                record.name,
                record.name.to_lowercase(),
                record.height,
                record.weight,
                record.base_experience,
                types_json,
                abilities_json,
                stats_json,
                sprites_json,
                now,
            ],
        )?;

        debug!("Upserted pokemon {} ({})", record.id, record.name);
        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn list(&self, query: &CatalogQuery) -> Result<Page<StoredRecord>> {
        let query = query.normalized();
        let conn = self.lock()?;

        let mut where_clause = String::from("WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(search) = &query.search {
            where_clause.push_str(" AND name_lower LIKE ? ESCAPE '\\'");
            params_vec.push(Box::new(like_pattern(search)));
        }

        if let Some(type_filter) = &query.type_filter {
            where_clause.push_str(
                " AND EXISTS (SELECT 1 FROM json_each(pokemon.types_json) WHERE lower(json_each.value) = ?)",
            );
            params_vec.push(Box::new(type_filter.clone()));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let count_sql = format!("SELECT COUNT(*) FROM pokemon {}", where_clause);
        let total: i64 = conn.query_row(&count_sql, params_refs.as_slice(), |row| row.get(0))?;

        let sql = format!(
            "SELECT {} FROM pokemon {} ORDER BY id ASC LIMIT {} OFFSET {}",
            COLUMNS,
            where_clause,
            query.per_page,
            query.offset()
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_refs.as_slice(), Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page::new(items, query.page, query.per_page, total as u64))
    }

    fn list_types(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT json_each.value FROM pokemon, json_each(pokemon.types_json)
             ORDER BY json_each.value",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut types = Vec::new();
        for row in rows {
            types.push(row?);
        }
        Ok(types)
    }

    fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM pokemon", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_in_range(&self, start: u32, end: u32) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pokemon WHERE id BETWEEN ?1 AND ?2",
            params![start, end],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn delete(&self, id: u32) -> Result<bool> {
        let conn = self.lock()?;
        let rows_affected = conn.execute("DELETE FROM pokemon WHERE id = ?1", params![id])?;
        if rows_affected > 0 {
            debug!("Deleted pokemon {}", id);
        }
        Ok(rows_affected > 0)
    }

    fn clear(&self) -> Result<u64> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM pokemon", [])?;
        debug!("Cleared {} catalog records", removed);
        Ok(removed as u64)
    }
}
