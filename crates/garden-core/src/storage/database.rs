//! SQLite-backed durable storage.
//!
//! Provides persistent storage for:
//! - The key-value table holding timer fields and the application state blob
//! - The shell cache generations and their entries

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::{data_dir, KeyValueStore, KvRead, KvWrite};
use crate::cache::{CacheStorage, Response};
use crate::error::StorageError;

/// SQLite database for durable app storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/garden.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StorageError> {
        let path = data_dir()?.join("garden.db");
        Self::open_at(path)
    }

    /// Open a database file at an explicit path.
    pub fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cache_generations (
                name       TEXT PRIMARY KEY,
                registry   TEXT NOT NULL,
                created_at TEXT NOT NULL,
                activated  INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                generation  TEXT NOT NULL REFERENCES cache_generations(name) ON DELETE CASCADE,
                request_key TEXT NOT NULL,
                status      INTEGER NOT NULL,
                headers     TEXT NOT NULL DEFAULT '{}',
                body        BLOB NOT NULL,
                stored_at   TEXT NOT NULL,
                PRIMARY KEY (generation, request_key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_generations_registry
                ON cache_generations(registry);",
        )?;
        Ok(())
    }

    fn ensure_generation(
        conn: &Connection,
        registry: &str,
        name: &str,
    ) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT OR IGNORE INTO cache_generations (name, registry, created_at)
             VALUES (?1, ?2, ?3)",
            params![name, registry, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn insert_entry(
        conn: &Connection,
        generation: &str,
        key: &str,
        response: &Response,
    ) -> Result<(), StorageError> {
        let headers = serde_json::to_string(&response.headers)
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
                 (generation, request_key, status, headers, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                generation,
                key,
                response.status,
                headers,
                response.body,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn is_generation(
        conn: &Connection,
        registry: &str,
        name: &str,
    ) -> Result<bool, rusqlite::Error> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM cache_generations WHERE registry = ?1 AND name = ?2)",
            params![registry, name],
            |row| row.get::<_, bool>(0),
        )
    }

    fn read_kv(conn: &Connection, key: &str) -> Result<Option<String>, StorageError> {
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn write_kv(conn: &Connection, batch: &[KvWrite]) -> Result<(), StorageError> {
        for write in batch {
            match write {
                KvWrite::Set { key, value } => {
                    conn.execute(
                        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )?;
                }
                KvWrite::Remove { key } => {
                    conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                }
            }
        }
        Ok(())
    }
}

/// Reads made inside an `update` transaction.
struct TxReader<'a>(&'a Connection);

impl KvRead for TxReader<'_> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Database::read_kv(self.0, key)
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::read_kv(&self.conn, key)
    }

    fn apply(&self, batch: &[KvWrite]) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        Self::write_kv(&tx, batch)?;
        tx.commit()?;
        Ok(())
    }

    /// Runs in a `BEGIN IMMEDIATE` transaction: the write lock is taken
    /// before the first read, so another connection cannot commit in between.
    fn update<T, E>(
        &self,
        f: impl FnOnce(&dyn KvRead) -> Result<(T, Vec<KvWrite>), E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        let (value, writes) = f(&TxReader(&tx))?;
        Self::write_kv(&tx, &writes)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(value)
    }
}

impl CacheStorage for Database {
    fn generations(&self, registry: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM cache_generations WHERE registry = ?1 ORDER BY created_at, name",
        )?;
        let rows = stmt.query_map(params![registry], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    fn delete_generation(&self, name: &str) -> Result<bool, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM cache_entries WHERE generation = ?1", params![name])?;
        let removed = tx.execute("DELETE FROM cache_generations WHERE name = ?1", params![name])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn lookup(&self, generation: &str, key: &str) -> Result<Option<Response>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT status, headers, body FROM cache_entries
                 WHERE generation = ?1 AND request_key = ?2",
                params![generation, key],
                |row| {
                    Ok((
                        row.get::<_, u16>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((status, headers, body)) => {
                let headers = serde_json::from_str(&headers).unwrap_or_else(|e| {
                    tracing::warn!(
                        generation,
                        key,
                        error = %e,
                        "cached headers unreadable, dropping them"
                    );
                    Default::default()
                });
                Ok(Some(Response {
                    status,
                    headers,
                    body,
                }))
            }
        }
    }

    fn active_generation(&self, registry: &str) -> Result<Option<String>, StorageError> {
        let name = self
            .conn
            .query_row(
                "SELECT name FROM cache_generations WHERE registry = ?1 AND activated = 1
                 ORDER BY created_at DESC, name DESC LIMIT 1",
                params![registry],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(name)
    }

    fn mark_active(&self, registry: &str, generation: &str) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        if !Self::is_generation(&tx, registry, generation)? {
            return Err(StorageError::QueryFailed(format!(
                "no generation {generation} in registry {registry}"
            )));
        }
        tx.execute(
            "UPDATE cache_generations SET activated = (name = ?2) WHERE registry = ?1",
            params![registry, generation],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn put(
        &self,
        registry: &str,
        generation: &str,
        key: &str,
        response: &Response,
    ) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        Self::ensure_generation(&tx, registry, generation)?;
        Self::insert_entry(&tx, generation, key, response)?;
        tx.commit()?;
        Ok(())
    }

    fn put_all(
        &self,
        registry: &str,
        generation: &str,
        entries: &[(String, Response)],
    ) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        Self::ensure_generation(&tx, registry, generation)?;
        for (key, response) in entries {
            Self::insert_entry(&tx, generation, key, response)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn entry_count(&self, generation: &str) -> Result<usize, StorageError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE generation = ?1",
            params![generation],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count as usize)
    }
}
