//! Error types shared by the cache, the upstream client and the hub.

use thiserror::Error;

/// Failure of the local cache medium.
///
/// Never fatal: readers treat it as a miss and writers carry on without
/// caching.
#[derive(Debug, Error)]
pub enum CacheError {
  /// Quota exceeded, medium disabled, lock poisoned or I/O failure
  #[error("cache storage unavailable: {0}")]
  StorageUnavailable(String),
  /// Payload could not be encoded for storage
  #[error("failed to encode cache entry: {0}")]
  Encode(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for CacheError {
  fn from(e: rusqlite::Error) -> Self {
    Self::StorageUnavailable(e.to_string())
  }
}

/// Failure talking to the upstream document store.
#[derive(Debug, Error)]
pub enum UpstreamError {
  /// Connection refused, DNS failure or timeout
  #[error("upstream unreachable: {0}")]
  Unreachable(String),
  #[error("request to {url} failed: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },
  #[error("{0} not found")]
  NotFound(String),
  #[error("upstream returned {status} for {url}")]
  Status { status: u16, url: String },
  #[error("failed to decode upstream response: {0}")]
  Decode(String),
  /// The upstream state makes the requested change invalid
  #[error("{0}")]
  Rejected(String),
  #[error("invalid upstream url: {0}")]
  Url(String),
}

impl UpstreamError {
  pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
    if e.is_connect() || e.is_timeout() {
      Self::Unreachable(e.to_string())
    } else {
      Self::Request {
        url: url.to_string(),
        source: e,
      }
    }
  }
}

/// Errors surfaced to the user-facing layer.
#[derive(Debug, Error)]
pub enum HubError {
  /// A fetch failed and there was no cached snapshot to fall back on
  #[error("failed to load {key}: {message}")]
  FetchFailed { key: String, message: String },
  /// A mutating action failed; it is never retried
  #[error("{action} failed: {source}")]
  MutationFailed {
    action: String,
    #[source]
    source: UpstreamError,
  },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rusqlite_errors_become_storage_unavailable() {
    let err: CacheError = rusqlite::Error::InvalidQuery.into();
    assert!(matches!(err, CacheError::StorageUnavailable(_)));
  }

  #[test]
  fn test_mutation_failed_message_names_action() {
    let err = HubError::MutationFailed {
      action: "join club".to_string(),
      source: UpstreamError::Rejected("User is already a member of this club".to_string()),
    };
    assert_eq!(
      err.to_string(),
      "join club failed: User is already a member of this club"
    );
  }
}
