//! Cache entries and lookup results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A snapshot of one resource as written to the medium.
///
/// Persisted as `{"timestamp": <epoch millis>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
  pub captured_at: DateTime<Utc>,
  #[serde(rename = "data")]
  pub payload: T,
}

impl<T> CacheEntry<T> {
  pub fn new(payload: T) -> Self {
    Self {
      captured_at: Utc::now(),
      payload,
    }
  }

  /// Age relative to now. Negative if the clock moved backwards.
  pub fn age(&self) -> chrono::Duration {
    Utc::now() - self.captured_at
  }
}

/// Why a lookup produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
  /// No entry under the key
  Absent,
  /// Entry was older than the max age and has been removed
  Expired,
  /// Entry could not be decoded and has been removed
  Corrupt,
  /// The medium failed
  Unavailable,
}

/// Result of reading a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
  Hit(CacheEntry<T>),
  Miss(MissReason),
}

impl<T> Lookup<T> {
  pub fn is_hit(&self) -> bool {
    matches!(self, Lookup::Hit(_))
  }

  /// The payload, if any.
  pub fn into_payload(self) -> Option<T> {
    match self {
      Lookup::Hit(entry) => Some(entry.payload),
      Lookup::Miss(_) => None,
    }
  }

  pub fn miss_reason(&self) -> Option<MissReason> {
    match self {
      Lookup::Hit(_) => None,
      Lookup::Miss(reason) => Some(*reason),
    }
  }
}

/// Summary of one stored entry, for inspection.
#[derive(Debug, Clone)]
pub struct EntryInfo {
  pub key: String,
  pub captured_at: DateTime<Utc>,
  /// Size of the stored string in bytes
  pub bytes: usize,
  pub expired: bool,
}
