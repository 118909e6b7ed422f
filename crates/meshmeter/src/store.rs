//! Durable key-value storage for the meter identity.
//!
//! The SQLite store keeps a single `kv` table in `~/.meshmeter/meter.db`.
//! `MemoryStore` offers the same interface without touching disk.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot determine home directory for the identity store")]
    NoHomeDir,
    #[error("stored identity is incomplete: '{present}' is set but '{missing}' is not")]
    Incomplete {
        present: &'static str,
        missing: &'static str,
    },
    #[error("meter identity was created concurrently but could not be read back")]
    Unreadable,
    #[error("store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Minimal string key-value store.
pub trait KeyValueStore {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write every entry, but only if none of the keys exists yet.
    ///
    /// The check and the write are one atomic operation. Returns `true`
    /// when the entries were written, `false` when at least one key was
    /// already present (nothing is written in that case).
    fn insert_all_if_absent(&self, entries: &[(&str, &str)]) -> Result<bool>;
}

/// SQLite-backed key-value store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    ///
    /// Creates the parent directory and the table if they don't exist.
    /// Sets WAL journal mode and file permissions to 0600.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key     TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            );",
        )?;

        // the secret lives here, owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                std::fs::set_permissions(path, perms)?;
            }
        }

        log::debug!("Opened identity store at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn insert_all_if_absent(&self, entries: &[(&str, &str)]) -> Result<bool> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        // IMMEDIATE takes the write lock before the existence check
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for (key, _) in entries {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM kv WHERE key = ?1)",
                params![key],
                |row| row.get(0),
            )?;
            if exists {
                tx.rollback()?;
                return Ok(false);
            }
        }
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(true)
    }
}

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store with existing entries.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn insert_all_if_absent(&self, new_entries: &[(&str, &str)]) -> Result<bool> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        if new_entries.iter().any(|(k, _)| entries.contains_key(*k)) {
            return Ok(false);
        }
        for (key, value) in new_entries {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(true)
    }
}
