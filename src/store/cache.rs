//! SQLite cache store
//!
//! Hashes, lists and expiring locks over three small tables. Lists follow the
//! usual push-to-head, pop-from-tail convention so `lpush` + `rpop` is FIFO.

use crate::store::schema::initialize_cache_schema;
use crate::store::traits::{CacheOp, CacheStore, StorageError, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_cache_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory cache (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_cache_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("cache lock poisoned".to_string()))
    }
}

fn apply_hset(conn: &Connection, key: &str, field: &str, value: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO hash_fields (key, field, value) VALUES (?1, ?2, ?3)
         ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
        params![key, field, value],
    )
}

fn apply_lpush(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO list_items (key, value) VALUES (?1, ?2)",
        params![key, value],
    )
}

impl CacheStore for SqliteCache {
    fn hset(&self, key: &str, field: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        apply_hset(&conn, key, field, value)?;
        Ok(())
    }

    fn hsetnx(&self, key: &str, field: &str, value: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO hash_fields (key, field, value) VALUES (?1, ?2, ?3)",
            params![key, field, value],
        )?;
        Ok(inserted == 1)
    }

    fn hget(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM hash_fields WHERE key = ?1 AND field = ?2",
                params![key, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn hexists(&self, key: &str, field: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM hash_fields WHERE key = ?1 AND field = ?2",
                params![key, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn htake(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let value: Option<String> = tx
            .query_row(
                "SELECT value FROM hash_fields WHERE key = ?1 AND field = ?2",
                params![key, field],
                |row| row.get(0),
            )
            .optional()?;

        if value.is_some() {
            tx.execute(
                "DELETE FROM hash_fields WHERE key = ?1 AND field = ?2",
                params![key, field],
            )?;
        }

        tx.commit()?;
        Ok(value)
    }

    fn lpush(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        apply_lpush(&conn, key, value)?;
        Ok(())
    }

    fn rpop(&self, key: &str) -> StorageResult<Option<String>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let item: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, value FROM list_items WHERE key = ?1 ORDER BY id LIMIT 1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, value)) = item else {
            return Ok(None);
        };

        tx.execute("DELETE FROM list_items WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(Some(value))
    }

    fn llen(&self, key: &str) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM list_items WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn pipeline(&self, ops: &[CacheOp]) -> StorageResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for op in ops {
            match op {
                CacheOp::HSet { key, field, value } => {
                    apply_hset(&tx, key, field, value)?;
                }
                CacheOp::LPush { key, value } => {
                    apply_lpush(&tx, key, value)?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn try_lock(&self, name: &str, ttl: Duration) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp_millis();
        let expires_at = now + ttl.as_millis() as i64;

        tx.execute(
            "DELETE FROM locks WHERE name = ?1 AND expires_at <= ?2",
            params![name, now],
        )?;
        let taken = tx.execute(
            "INSERT OR IGNORE INTO locks (name, expires_at) VALUES (?1, ?2)",
            params![name, expires_at],
        )?;

        tx.commit()?;
        Ok(taken == 1)
    }

    fn release_lock(&self, name: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM locks WHERE name = ?1", params![name])?;
        Ok(())
    }
}
