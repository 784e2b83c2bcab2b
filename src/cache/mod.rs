//! Offline snapshot cache.
//!
//! This module provides a domain-agnostic stale-while-revalidate store that:
//! - Keeps the latest snapshot per resource key, stamped with its capture time
//! - Expires entries on read once they exceed a max age (24 hours by default)
//! - Degrades to always-miss when the storage medium fails
//! - Persists to SQLite by default, so snapshots survive restarts

mod entry;
mod layer;
mod storage;

use tracing::warn;

use crate::config::{CacheConfig, CacheMedium};

pub use entry::{CacheEntry, EntryInfo, Lookup, MissReason};
pub use layer::OfflineCache;
pub use storage::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};

/// Open the configured cache, falling back to no caching if the medium
/// cannot be opened.
pub fn open(config: &CacheConfig) -> OfflineCache {
  let cache = if !config.enabled {
    OfflineCache::new(NoopStore)
  } else {
    match config.medium {
      CacheMedium::Memory => match config.quota_bytes {
        Some(quota) => OfflineCache::new(MemoryStore::with_quota(quota)),
        None => OfflineCache::new(MemoryStore::new()),
      },
      CacheMedium::Sqlite => {
        let opened = match &config.path {
          Some(path) => SqliteStore::open(path),
          None => SqliteStore::open_default(),
        };
        match opened {
          Ok(store) => OfflineCache::new(store),
          Err(e) => {
            warn!(error = %e, "cache unavailable, continuing without it");
            OfflineCache::new(NoopStore)
          }
        }
      }
    }
  };

  cache.with_max_age(config.max_age())
}
