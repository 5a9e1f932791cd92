//! SQLite-backed result cache.
//!
//! A single-file key/value table with per-entry timestamps. Entries are
//! served while younger than the TTL; writes enforce a size ceiling over
//! the stored values by evicting the oldest entries first.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::ProviderResult;

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metadata_cache (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_metadata_cache_updated_at
    ON metadata_cache(updated_at);
"#;

/// Disk-backed cache of provider results.
#[derive(Clone)]
pub struct DiskCache {
    conn: Arc<Mutex<Connection>>,
    ttl: Duration,
    size_limit_bytes: u64,
}

impl DiskCache {
    /// Open a file-backed cache.
    pub fn open(path: &Path, ttl_secs: u64, size_limit_bytes: u64) -> ProviderResult<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, ttl_secs, size_limit_bytes)
    }

    /// Open an in-memory cache (for testing, or when no path is configured).
    pub fn memory(ttl_secs: u64, size_limit_bytes: u64) -> ProviderResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, ttl_secs, size_limit_bytes)
    }

    fn with_connection(
        conn: Connection,
        ttl_secs: u64,
        size_limit_bytes: u64,
    ) -> ProviderResult<Self> {
        // WAL is a no-op for in-memory connections.
        let _ = conn.execute("PRAGMA journal_mode = WAL", []);
        conn.execute_batch(CACHE_SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl: Duration::seconds(ttl_secs as i64),
            size_limit_bytes,
        })
    }

    /// Get a cached value, if present and younger than the TTL.
    pub fn get(&self, key: &str) -> ProviderResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, updated_at FROM metadata_cache WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((value, updated_at)) = row else {
            return Ok(None);
        };

        let updated_at = DateTime::<Utc>::from_timestamp(updated_at, 0).unwrap_or_default();
        if Utc::now() - updated_at < self.ttl {
            debug!(key, "metadata cache hit");
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    /// Store a value, evicting the oldest entries past the size ceiling.
    pub fn put(&self, key: &str, value: &str) -> ProviderResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO metadata_cache (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().timestamp()],
        )?;

        loop {
            let stored: u64 = conn.query_row(
                "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM metadata_cache",
                [],
                |row| row.get::<_, i64>(0).map(|v| v as u64),
            )?;
            if stored <= self.size_limit_bytes {
                break;
            }

            let oldest: Option<String> = conn
                .query_row(
                    "SELECT key FROM metadata_cache ORDER BY updated_at ASC, key ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(oldest) = oldest else {
                break;
            };
            // Never evict the entry just written.
            if oldest == key {
                break;
            }
            debug!(key = %oldest, "evicting cache entry over size ceiling");
            conn.execute("DELETE FROM metadata_cache WHERE key = ?1", params![oldest])?;
        }

        Ok(())
    }
}
