use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StorageError;

pub const TOKEN_KEY: &str = "session.token";
pub const IDENTITY_KEY: &str = "session.identity";
pub const SETTINGS_CURRENT_KEY: &str = "settings.current";
pub const SETTINGS_BASELINE_KEY: &str = "settings.baseline";

/// Ephemeral per-tab storage. Values are overwritten wholesale; there is no
/// coordination between writers (last writer wins).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.clear();
        Ok(())
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let store = Self { conn: Mutex::new(Connection::open(path)?) };
        store.init()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let store = Self { conn: Mutex::new(Connection::open_in_memory()?) };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute("DELETE FROM kv", [])?;
        Ok(())
    }
}

/// Opens the store named by `STORAGE_PATH`.
pub fn open_store(path: &str) -> Result<Arc<dyn KeyValueStore>, StorageError> {
    match path {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        ":memory:" => Ok(Arc::new(SqliteStore::in_memory()?)),
        _ => Ok(Arc::new(SqliteStore::new(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get(TOKEN_KEY).unwrap(), None);
        store.set(TOKEN_KEY, "a").unwrap();
        store.set(TOKEN_KEY, "b").unwrap();
        assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("b"));
        store.set(IDENTITY_KEY, "x").unwrap();
        store.remove(TOKEN_KEY).unwrap();
        assert_eq!(store.get(TOKEN_KEY).unwrap(), None);
        store.clear().unwrap();
        assert_eq!(store.get(IDENTITY_KEY).unwrap(), None);
    }

    #[test]
    fn test_memory_store_overwrites_wholesale() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store_overwrites_wholesale() {
        exercise(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_open_store_selects_backend() {
        let store = open_store("memory").unwrap();
        store.set(SETTINGS_CURRENT_KEY, "{}").unwrap();
        assert!(store.get(SETTINGS_CURRENT_KEY).unwrap().is_some());
    }
}
