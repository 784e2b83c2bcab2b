//! Key/value media backing the offline cache.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::CacheError;

/// Synchronous string key/value storage.
///
/// Every operation may fail when the medium is full or unavailable.
pub trait KeyValueStore: Send + Sync {
  fn get_string(&self, key: &str) -> Result<Option<String>, CacheError>;

  fn set_string(&self, key: &str, value: &str) -> Result<(), CacheError>;

  fn remove(&self, key: &str) -> Result<(), CacheError>;

  /// Remove every key.
  fn clear(&self) -> Result<(), CacheError>;

  fn keys(&self) -> Result<Vec<String>, CacheError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
  fn get_string(&self, key: &str) -> Result<Option<String>, CacheError> {
    (**self).get_string(key)
  }

  fn set_string(&self, key: &str, value: &str) -> Result<(), CacheError> {
    (**self).set_string(key, value)
  }

  fn remove(&self, key: &str) -> Result<(), CacheError> {
    (**self).remove(key)
  }

  fn clear(&self) -> Result<(), CacheError> {
    (**self).clear()
  }

  fn keys(&self) -> Result<Vec<String>, CacheError> {
    (**self).keys()
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl KeyValueStore for NoopStore {
  fn get_string(&self, _key: &str) -> Result<Option<String>, CacheError> {
    Ok(None) // Always miss
  }

  fn set_string(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &str) -> Result<(), CacheError> {
    Ok(())
  }

  fn clear(&self) -> Result<(), CacheError> {
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>, CacheError> {
    Ok(Vec::new())
  }
}

/// In-process storage with an optional quota on the total stored bytes.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
  quota: Option<usize>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Limit the sum of key and value lengths. Writes past the limit fail.
  pub fn with_quota(quota: usize) -> Self {
    Self {
      entries: Mutex::default(),
      quota: Some(quota),
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, CacheError> {
    self
      .entries
      .lock()
      .map_err(|e| CacheError::StorageUnavailable(format!("Lock poisoned: {}", e)))
  }
}

impl KeyValueStore for MemoryStore {
  fn get_string(&self, key: &str) -> Result<Option<String>, CacheError> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set_string(&self, key: &str, value: &str) -> Result<(), CacheError> {
    let mut entries = self.lock()?;

    if let Some(quota) = self.quota {
      let used: usize = entries
        .iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, v)| k.len() + v.len())
        .sum();
      if used + key.len() + value.len() > quota {
        return Err(CacheError::StorageUnavailable(format!(
          "quota of {} bytes exceeded",
          quota
        )));
      }
    }

    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), CacheError> {
    self.lock()?.remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<(), CacheError> {
    self.lock()?.clear();
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>, CacheError> {
    let mut keys: Vec<String> = self.lock()?.keys().cloned().collect();
    keys.sort();
    Ok(keys)
  }
}

/// SQLite-based storage, durable across restarts.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("eventhub").join("cache.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
    self
      .conn
      .lock()
      .map_err(|e| CacheError::StorageUnavailable(format!("Lock poisoned: {}", e)))
  }
}

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl KeyValueStore for SqliteStore {
  fn get_string(&self, key: &str) -> Result<Option<String>, CacheError> {
    let conn = self.lock()?;
    let value = conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()?;
    Ok(value)
  }

  fn set_string(&self, key: &str, value: &str) -> Result<(), CacheError> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), CacheError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM kv WHERE key = ?", params![key])?;
    Ok(())
  }

  fn clear(&self) -> Result<(), CacheError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM kv", [])?;
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>, CacheError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
    let keys = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      store.set_string("events", "[1,2]").unwrap();
      store.set_string("events", "[3]").unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.get_string("events").unwrap().as_deref(), Some("[3]"));
    assert_eq!(store.keys().unwrap(), vec!["events".to_string()]);
  }

  #[test]
  fn test_sqlite_store_remove_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("cache.db")).unwrap();

    store.set_string("a", "1").unwrap();
    store.set_string("b", "2").unwrap();
    store.remove("a").unwrap();
    store.remove("a").unwrap();
    assert_eq!(store.get_string("a").unwrap(), None);
    assert_eq!(store.keys().unwrap(), vec!["b".to_string()]);

    store.clear().unwrap();
    assert!(store.keys().unwrap().is_empty());
  }

  #[test]
  fn test_memory_store_quota() {
    let store = MemoryStore::with_quota(10);

    store.set_string("k", "12345").unwrap();
    assert!(matches!(
      store.set_string("other", "123456"),
      Err(CacheError::StorageUnavailable(_))
    ));

    // Overwriting the same key only counts the new value
    store.set_string("k", "123456789").unwrap();
    assert_eq!(store.get_string("k").unwrap().as_deref(), Some("123456789"));
  }

  #[test]
  fn test_noop_store_always_misses() {
    let store = NoopStore;
    store.set_string("k", "v").unwrap();
    assert_eq!(store.get_string("k").unwrap(), None);
    assert!(store.keys().unwrap().is_empty());
  }
}
