//! Stale-while-revalidate cache over a key/value medium.

use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, EntryInfo, Lookup, MissReason};
use super::storage::KeyValueStore;
use crate::error::CacheError;

/// Keyed snapshot store shared by every consumer.
///
/// Built once at startup and handed around by clone; clones share the
/// same medium. The cache is an optimization only: read failures degrade
/// to misses and are logged, never raised.
pub struct OfflineCache {
  storage: Arc<dyn KeyValueStore>,
  /// Entries older than this are discarded on read
  max_age: Duration,
}

impl OfflineCache {
  /// Create a new cache with the given storage backend.
  pub fn new(storage: impl KeyValueStore + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
      max_age: Duration::hours(24),
    }
  }

  /// Set the default max age used by `get`.
  pub fn with_max_age(mut self, max_age: Duration) -> Self {
    self.max_age = max_age;
    self
  }

  pub fn max_age(&self) -> Duration {
    self.max_age
  }

  /// Store `payload` under `key`, stamped with the current time.
  pub fn put<T: Serialize>(&self, key: &str, payload: &T) -> Result<(), CacheError> {
    let raw = serde_json::to_string(&CacheEntry::new(payload))?;
    self.storage.set_string(key, &raw)?;
    debug!(key, bytes = raw.len(), "cache write");
    Ok(())
  }

  /// Read `key` using the default max age.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
    self.get_within(key, self.max_age)
  }

  /// Read `key`, treating entries older than `max_age` as absent.
  ///
  /// Expired and undecodable entries are removed as a side effect.
  pub fn get_within<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Lookup<T> {
    let raw = match self.storage.get_string(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => {
        debug!(key, "cache miss");
        return Lookup::Miss(MissReason::Absent);
      }
      Err(e) => {
        warn!(key, error = %e, "cache read failed");
        return Lookup::Miss(MissReason::Unavailable);
      }
    };

    let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(key, error = %e, "discarding unreadable cache entry");
        self.discard(key);
        return Lookup::Miss(MissReason::Corrupt);
      }
    };

    if entry.age() > max_age {
      debug!(key, captured_at = %entry.captured_at, "cache entry expired");
      self.discard(key);
      return Lookup::Miss(MissReason::Expired);
    }

    debug!(key, captured_at = %entry.captured_at, "cache hit");
    Lookup::Hit(entry)
  }

  /// Remove the entry for `key`, or every entry when `key` is `None`.
  pub fn clear(&self, key: Option<&str>) -> Result<(), CacheError> {
    match key {
      Some(key) => {
        self.storage.remove(key)?;
        info!(key, "cache entry cleared");
      }
      None => {
        self.storage.clear()?;
        info!("cache cleared");
      }
    }
    Ok(())
  }

  /// List stored entries. Entries that cannot be parsed are skipped.
  pub fn entries(&self) -> Result<Vec<EntryInfo>, CacheError> {
    let now = Utc::now();
    let mut infos = Vec::new();

    for key in self.storage.keys()? {
      let Some(raw) = self.storage.get_string(&key)? else {
        continue;
      };
      let Ok(entry) = serde_json::from_str::<CacheEntry<serde_json::Value>>(&raw) else {
        continue;
      };
      infos.push(EntryInfo {
        expired: now - entry.captured_at > self.max_age,
        captured_at: entry.captured_at,
        bytes: raw.len(),
        key,
      });
    }

    Ok(infos)
  }

  fn discard(&self, key: &str) {
    if let Err(e) = self.storage.remove(key) {
      warn!(key, error = %e, "failed to remove cache entry");
    }
  }
}

impl Clone for OfflineCache {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      max_age: self.max_age,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::{MemoryStore, NoopStore, SqliteStore};
  use serde_json::{json, Value};

  /// Write an entry with an explicit capture time, bypassing `put`.
  fn seed(store: &MemoryStore, key: &str, age: Duration, payload: Value) {
    let entry = CacheEntry {
      captured_at: Utc::now() - age,
      payload,
    };
    store
      .set_string(key, &serde_json::to_string(&entry).unwrap())
      .unwrap();
  }

  /// A store whose every operation fails.
  struct BrokenStore;

  impl KeyValueStore for BrokenStore {
    fn get_string(&self, _key: &str) -> Result<Option<String>, CacheError> {
      Err(CacheError::StorageUnavailable("disabled".into()))
    }
    fn set_string(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
      Err(CacheError::StorageUnavailable("disabled".into()))
    }
    fn remove(&self, _key: &str) -> Result<(), CacheError> {
      Err(CacheError::StorageUnavailable("disabled".into()))
    }
    fn clear(&self) -> Result<(), CacheError> {
      Err(CacheError::StorageUnavailable("disabled".into()))
    }
    fn keys(&self) -> Result<Vec<String>, CacheError> {
      Err(CacheError::StorageUnavailable("disabled".into()))
    }
  }

  #[test]
  fn test_put_then_get_returns_payload() {
    let cache = OfflineCache::new(MemoryStore::new());
    let payload = json!({"id": "c1", "name": "Chess Club"});

    cache.put("club-c1", &payload).unwrap();

    assert_eq!(cache.get::<Value>("club-c1").into_payload(), Some(payload));
  }

  #[test]
  fn test_last_write_wins() {
    let cache = OfflineCache::new(MemoryStore::new());

    cache.put("notices", &vec!["a"]).unwrap();
    cache.put("notices", &vec!["b"]).unwrap();

    assert_eq!(
      cache.get::<Vec<String>>("notices").into_payload(),
      Some(vec!["b".to_string()])
    );
  }

  #[test]
  fn test_expired_entry_is_purged() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "events", Duration::hours(30), json!([{"id": "e1"}]));
    let cache = OfflineCache {
      storage: store.clone(),
      max_age: Duration::hours(24),
    };

    assert_eq!(
      cache.get::<Value>("events"),
      Lookup::Miss(MissReason::Expired)
    );
    assert_eq!(store.get_string("events").unwrap(), None);
    assert_eq!(
      cache.get::<Value>("events"),
      Lookup::Miss(MissReason::Absent)
    );
  }

  #[test]
  fn test_entry_within_max_age_is_hit() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "club-c1", Duration::hours(1), json!({"name": "Chess Club"}));
    let cache = OfflineCache {
      storage: store,
      max_age: Duration::hours(24),
    };

    let lookup = cache.get::<Value>("club-c1");
    assert!(lookup.is_hit());
    assert!(cache
      .get_within::<Value>("club-c1", Duration::minutes(30))
      .miss_reason()
      .is_some());
  }

  #[test]
  fn test_corrupt_entry_is_removed() {
    let store = Arc::new(MemoryStore::new());
    store.set_string("events", "not json").unwrap();
    let cache = OfflineCache {
      storage: store.clone(),
      max_age: Duration::hours(24),
    };

    assert_eq!(
      cache.get::<Value>("events"),
      Lookup::Miss(MissReason::Corrupt)
    );
    assert_eq!(store.get_string("events").unwrap(), None);
  }

  #[test]
  fn test_clear_is_idempotent() {
    let cache = OfflineCache::new(MemoryStore::new());
    cache.put("events", &1).unwrap();
    cache.put("clubs", &2).unwrap();

    cache.clear(Some("events")).unwrap();
    cache.clear(Some("events")).unwrap();

    assert!(!cache.get::<i32>("events").is_hit());
    assert!(cache.get::<i32>("clubs").is_hit());

    cache.clear(None).unwrap();
    cache.clear(None).unwrap();
    assert!(!cache.get::<i32>("clubs").is_hit());
  }

  #[test]
  fn test_broken_medium_degrades_to_miss() {
    let cache = OfflineCache::new(BrokenStore);

    assert!(matches!(
      cache.put("events", &1),
      Err(CacheError::StorageUnavailable(_))
    ));
    assert_eq!(
      cache.get::<i32>("events"),
      Lookup::Miss(MissReason::Unavailable)
    );
  }

  #[test]
  fn test_quota_exceeded_put_fails_without_touching_existing_entry() {
    let cache = OfflineCache::new(MemoryStore::with_quota(64));
    cache.put("a", &"x").unwrap();

    let big = "y".repeat(128);
    assert!(cache.put("b", &big).is_err());
    assert!(cache.get::<String>("a").is_hit());
    assert!(!cache.get::<String>("b").is_hit());
  }

  #[test]
  fn test_noop_store_never_hits() {
    let cache = OfflineCache::new(NoopStore);
    cache.put("events", &1).unwrap();
    assert_eq!(cache.get::<i32>("events"), Lookup::Miss(MissReason::Absent));
  }

  #[test]
  fn test_entries_lists_sqlite_contents() {
    let dir = tempfile::tempdir().unwrap();
    let cache = OfflineCache::new(SqliteStore::open(&dir.path().join("cache.db")).unwrap());

    cache.put("clubs", &json!([{"id": "c1"}])).unwrap();
    cache.put("events", &json!([])).unwrap();

    let entries = cache.entries().unwrap();
    let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["clubs", "events"]);
    assert!(entries.iter().all(|e| !e.expired && e.bytes > 0));
  }
}
