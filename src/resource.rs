//! Per-view fetch, cache and reconcile coordination.
//!
//! A `Resource<T>` binds a cache key to a fetcher. Mounting it paints the
//! cached snapshot (if any) straight away, then revalidates against the
//! upstream in a spawned task. The task writes the cache itself, so the
//! snapshot is refreshed even if the view goes away before it finishes.
//!
//! # Example
//!
//! ```ignore
//! let client = upstream.clone();
//! let mut events = Resource::new("events", cache.clone(), move || {
//!     let client = client.clone();
//!     async move { client.list::<Event>("events", &ListQuery::new()).await }
//! });
//!
//! events.mount();
//! render(events.state()); // cached snapshot or loading
//!
//! // In event loop tick
//! if events.poll() {
//!     render(events.state()); // fresh data, offline snapshot or error
//! }
//! ```

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::{Lookup, OfflineCache};
use crate::error::{HubError, UpstreamError};

/// What a view should currently show.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderState<T> {
  /// Not mounted yet
  Idle,
  /// No snapshot; waiting for the first fetch
  Loading,
  /// Showing a cached snapshot while the fetch is in flight
  Revalidating {
    data: T,
    captured_at: DateTime<Utc>,
  },
  /// Showing data from the latest successful fetch
  Fresh(T),
  /// The fetch failed; still showing the cached snapshot
  Offline {
    data: T,
    captured_at: DateTime<Utc>,
    error: String,
  },
  /// The fetch failed and there was nothing to fall back on
  Error(String),
}

impl<T> RenderState<T> {
  pub fn data(&self) -> Option<&T> {
    match self {
      RenderState::Revalidating { data, .. }
      | RenderState::Fresh(data)
      | RenderState::Offline { data, .. } => Some(data),
      _ => None,
    }
  }

  /// Error to show to the user. Failures hidden behind a snapshot are not
  /// reported here.
  pub fn error(&self) -> Option<&str> {
    match self {
      RenderState::Error(e) => Some(e),
      _ => None,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, RenderState::Loading)
  }

  /// True while showing data that did not come from this view's own fetch.
  pub fn is_stale(&self) -> bool {
    matches!(
      self,
      RenderState::Revalidating { .. } | RenderState::Offline { .. }
    )
  }
}

/// Where the coordinator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Idle,
  Fetching,
  Settled,
}

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, UpstreamError>> + Send + Sync>;

/// Stale-while-revalidate coordinator for one view.
pub struct Resource<T> {
  key: String,
  label: Option<String>,
  cache: OfflineCache,
  fetcher: FetcherFn<T>,
  state: RenderState<T>,
  phase: Phase,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, UpstreamError>>>,
  fetched_at: Option<DateTime<Utc>>,
}

impl<T> Resource<T>
where
  T: Serialize + DeserializeOwned + Send + 'static,
{
  /// Create an unmounted resource. The fetcher is called once per mount
  /// or refresh.
  pub fn new<F, Fut>(key: impl Into<String>, cache: OfflineCache, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
  {
    Self {
      key: key.into(),
      label: None,
      cache,
      fetcher: Box::new(move || Box::pin(fetcher())),
      state: RenderState::Idle,
      phase: Phase::Idle,
      receiver: None,
      fetched_at: None,
    }
  }

  /// Name the resource for headings; defaults to the cache key.
  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = Some(label.into());
    self
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn label(&self) -> &str {
    self.label.as_deref().unwrap_or(self.key.as_str())
  }

  pub fn state(&self) -> &RenderState<T> {
    &self.state
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }

  /// When this view's own fetch last succeeded.
  pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
    self.fetched_at
  }

  /// Read the cache and start fetching.
  ///
  /// This is a no-op while a fetch is already in flight.
  pub fn mount(&mut self) {
    if self.phase == Phase::Fetching {
      return;
    }
    self.enter();
  }

  /// Re-enter from the cache read and fetch again, abandoning any pending
  /// fetch's render. The abandoned fetch still writes the cache.
  pub fn refresh(&mut self) {
    self.receiver = None;
    self.enter();
  }

  /// Stop rendering results for this view. An in-flight fetch keeps
  /// running and still writes the cache.
  pub fn unmount(&mut self) {
    self.receiver = None;
    self.phase = Phase::Idle;
  }

  /// Apply a finished fetch without blocking.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(result) => {
        self.receiver = None;
        self.settle(result);
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.receiver = None;
        self.settle(Err(task_lost()));
        true
      }
    }
  }

  /// Wait for the pending fetch, if any, and apply it.
  pub async fn settled(&mut self) -> &RenderState<T> {
    if let Some(rx) = self.receiver.as_mut() {
      let result = rx.recv().await.unwrap_or_else(|| Err(task_lost()));
      self.receiver = None;
      self.settle(result);
    }
    &self.state
  }

  /// Like `settled`, but surfaces an unrecovered fetch failure as an error.
  pub async fn load(&mut self) -> Result<&T, HubError> {
    let key = self.key.clone();
    match self.settled().await {
      RenderState::Error(message) => Err(HubError::FetchFailed {
        key,
        message: message.clone(),
      }),
      state => state.data().ok_or_else(|| HubError::FetchFailed {
        key,
        message: "resource is not mounted".to_string(),
      }),
    }
  }

  /// Run a mutating upstream call for this view.
  ///
  /// The cache is not touched; on success the view refreshes so the next
  /// fetch brings the change in. Failures are never retried.
  pub async fn mutate<Fut>(&mut self, action: &str, op: Fut) -> Result<(), HubError>
  where
    Fut: Future<Output = Result<(), UpstreamError>>,
  {
    match op.await {
      Ok(()) => {
        debug!(key = %self.key, action, "mutation succeeded, refreshing");
        self.refresh();
        Ok(())
      }
      Err(source) => {
        warn!(key = %self.key, action, error = %source, "mutation failed");
        Err(HubError::MutationFailed {
          action: action.to_string(),
          source,
        })
      }
    }
  }

  fn enter(&mut self) {
    self.state = match self.cache.get::<T>(&self.key) {
      Lookup::Hit(entry) => RenderState::Revalidating {
        data: entry.payload,
        captured_at: entry.captured_at,
      },
      Lookup::Miss(_) => RenderState::Loading,
    };
    self.start_fetch();
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.phase = Phase::Fetching;

    let future = (self.fetcher)();
    let cache = self.cache.clone();
    let key = self.key.clone();
    tokio::spawn(async move {
      let result = future.await;
      if let Ok(data) = &result {
        if let Err(e) = cache.put(&key, data) {
          warn!(key = %key, error = %e, "failed to cache fetched data");
        }
      }
      // Ignore send errors - the view may have been torn down
      let _ = tx.send(result);
    });
  }

  fn settle(&mut self, result: Result<T, UpstreamError>) {
    self.phase = Phase::Settled;
    self.state = match (result, std::mem::replace(&mut self.state, RenderState::Idle)) {
      (Ok(data), _) => {
        self.fetched_at = Some(Utc::now());
        RenderState::Fresh(data)
      }
      (Err(e), RenderState::Revalidating { data, captured_at }) => {
        warn!(key = %self.key, error = %e, "fetch failed, keeping cached data");
        RenderState::Offline {
          data,
          captured_at,
          error: e.to_string(),
        }
      }
      (Err(e), _) => {
        warn!(key = %self.key, error = %e, "fetch failed with no cached data");
        RenderState::Error(e.to_string())
      }
    };
  }
}

fn task_lost() -> UpstreamError {
  UpstreamError::Unreachable("fetch task ended without a result".to_string())
}

impl<T: std::fmt::Debug> std::fmt::Debug for Resource<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Resource")
      .field("key", &self.key)
      .field("label", &self.label)
      .field("state", &self.state)
      .field("phase", &self.phase)
      .field("fetched_at", &self.fetched_at)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheEntry, KeyValueStore, MemoryStore};
  use serde::Deserialize;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::sync::oneshot;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Club {
    id: String,
    name: String,
  }

  fn chess() -> Club {
    Club {
      id: "c1".to_string(),
      name: "Chess Club".to_string(),
    }
  }

  fn offline() -> UpstreamError {
    UpstreamError::Unreachable("network down".to_string())
  }

  fn crash() -> Result<Club, UpstreamError> {
    panic!("fetcher crashed")
  }

  /// Cache over a shared memory store, so tests can seed and inspect it.
  fn cache_with_store() -> (OfflineCache, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (OfflineCache::new(store.clone()), store)
  }

  fn seed<T: Serialize>(store: &MemoryStore, key: &str, age: chrono::Duration, payload: T) {
    let entry = CacheEntry {
      captured_at: Utc::now() - age,
      payload,
    };
    store
      .set_string(key, &serde_json::to_string(&entry).unwrap())
      .unwrap();
  }

  #[tokio::test]
  async fn test_cache_miss_then_fetch_populates_cache() {
    let (cache, _) = cache_with_store();
    let mut events = Resource::new("events", cache.clone(), || async {
      Ok::<_, UpstreamError>(vec!["e1".to_string()])
    });

    assert_eq!(events.state(), &RenderState::Idle);

    events.mount();
    assert!(events.state().is_loading());
    assert_eq!(events.phase(), Phase::Fetching);

    let state = events.settled().await.clone();
    assert_eq!(state, RenderState::Fresh(vec!["e1".to_string()]));
    assert_eq!(events.phase(), Phase::Settled);
    assert!(events.fetched_at().is_some());
    assert_eq!(
      cache.get::<Vec<String>>("events").into_payload(),
      Some(vec!["e1".to_string()])
    );
  }

  #[tokio::test]
  async fn test_cached_snapshot_survives_fetch_failure() {
    let (cache, store) = cache_with_store();
    seed(&store, "club-c1", chrono::Duration::hours(1), chess());

    let mut club: Resource<Club> =
      Resource::new("club-c1", cache.clone(), || async { Err(offline()) });

    club.mount();
    assert_eq!(club.data(), Some(&chess()));
    assert!(club.state().is_stale());

    club.settled().await;
    assert_eq!(club.data(), Some(&chess()));
    assert!(matches!(club.state(), RenderState::Offline { .. }));
    assert_eq!(club.error(), None);
    assert!(club.load().await.is_ok());
  }

  #[tokio::test]
  async fn test_expired_snapshot_is_not_shown() {
    let (cache, store) = cache_with_store();
    seed(&store, "club-c1", chrono::Duration::hours(30), chess());

    let mut club: Resource<Club> =
      Resource::new("club-c1", cache.clone(), || async { Err(offline()) });

    club.mount();
    assert!(club.state().is_loading());
    assert_eq!(store.get_string("club-c1").unwrap(), None);

    club.settled().await;
    assert!(club.error().is_some());
    assert!(matches!(
      club.load().await,
      Err(HubError::FetchFailed { .. })
    ));
  }

  #[tokio::test]
  async fn test_last_resolved_fetch_wins_in_cache() {
    let (cache, _) = cache_with_store();
    let (release_first, first_gate) = oneshot::channel::<()>();
    let first_gate = Arc::new(tokio::sync::Mutex::new(Some(first_gate)));

    let mut first = Resource::new("notices", cache.clone(), move || {
      let gate = first_gate.clone();
      async move {
        if let Some(gate) = gate.lock().await.take() {
          let _ = gate.await;
        }
        Ok::<_, UpstreamError>(vec!["from-first".to_string()])
      }
    });
    let mut second = Resource::new("notices", cache.clone(), || async {
      Ok::<_, UpstreamError>(vec!["from-second".to_string()])
    });

    first.mount();
    second.mount();
    second.settled().await;
    assert_eq!(
      cache.get::<Vec<String>>("notices").into_payload(),
      Some(vec!["from-second".to_string()])
    );

    release_first.send(()).unwrap();
    first.settled().await;

    assert_eq!(
      cache.get::<Vec<String>>("notices").into_payload(),
      Some(vec!["from-first".to_string()])
    );
    // Each view renders its own fetch
    assert_eq!(second.data(), Some(&vec!["from-second".to_string()]));
    assert_eq!(first.data(), Some(&vec!["from-first".to_string()]));
  }

  #[tokio::test]
  async fn test_unmount_suppresses_render_but_not_cache_write() {
    let (cache, _) = cache_with_store();
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(tokio::sync::Mutex::new(Some(gate)));

    let mut events = Resource::new("events", cache.clone(), move || {
      let gate = gate.clone();
      async move {
        if let Some(gate) = gate.lock().await.take() {
          let _ = gate.await;
        }
        Ok::<_, UpstreamError>(vec![1, 2, 3])
      }
    });

    events.mount();
    events.unmount();
    release.send(()).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!events.poll());
    assert!(events.state().is_loading());
    assert_eq!(
      cache.get::<Vec<i32>>("events").into_payload(),
      Some(vec![1, 2, 3])
    );
  }

  #[tokio::test]
  async fn test_poll_applies_result() {
    let (cache, _) = cache_with_store();
    let mut resource = Resource::new("answer", cache, || async { Ok::<_, UpstreamError>(42) });

    resource.mount();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(resource.poll());
    assert_eq!(resource.data(), Some(&42));
    assert!(!resource.poll());
  }

  #[tokio::test]
  async fn test_mount_while_fetching_is_noop() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    let (cache, _) = cache_with_store();

    let mut resource = Resource::new("slow", cache, move || {
      let counter = counter_clone.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, UpstreamError>(7)
      }
    });

    resource.mount();
    resource.mount();
    resource.settled().await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_refresh_shows_previous_fetch_as_snapshot() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    let (cache, _) = cache_with_store();

    let mut resource = Resource::new("count", cache, move || {
      let counter = counter_clone.clone();
      async move { Ok::<_, UpstreamError>(counter.fetch_add(1, Ordering::SeqCst)) }
    });

    resource.mount();
    resource.settled().await;
    assert_eq!(resource.state(), &RenderState::Fresh(0));

    resource.refresh();
    assert!(matches!(
      resource.state(),
      RenderState::Revalidating { data: 0, .. }
    ));
    resource.settled().await;
    assert_eq!(resource.state(), &RenderState::Fresh(1));
  }

  #[tokio::test]
  async fn test_failed_mutation_keeps_state_and_surfaces_error() {
    let (cache, _) = cache_with_store();
    let mut club = Resource::new("club-c1", cache, || async { Ok::<_, UpstreamError>(chess()) });

    club.mount();
    club.settled().await;

    let result = club
      .mutate("join club", async {
        Err(UpstreamError::Rejected("already a member".to_string()))
      })
      .await;

    assert!(matches!(result, Err(HubError::MutationFailed { .. })));
    assert_eq!(club.phase(), Phase::Settled);
    assert_eq!(club.state(), &RenderState::Fresh(chess()));
  }

  #[tokio::test]
  async fn test_successful_mutation_refetches() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    let (cache, _) = cache_with_store();

    let mut club = Resource::new("club-c1", cache, move || {
      let counter = counter_clone.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, UpstreamError>(chess())
      }
    });

    club.mount();
    club.settled().await;
    club.mutate("join club", async { Ok(()) }).await.unwrap();
    assert_eq!(club.phase(), Phase::Fetching);
    club.settled().await;

    assert_eq!(counter.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_crashed_fetch_without_snapshot_is_an_error() {
    let (cache, _) = cache_with_store();
    let mut club = Resource::new("club-c1", cache, || async { crash() });

    club.mount();
    club.settled().await;

    assert_eq!(club.phase(), Phase::Settled);
    assert!(club
      .error()
      .is_some_and(|e| e.contains("fetch task ended without a result")));
  }

  #[tokio::test]
  async fn test_crashed_fetch_keeps_snapshot_on_poll() {
    let (cache, store) = cache_with_store();
    seed(&store, "club-c1", chrono::Duration::hours(1), chess());
    let mut club = Resource::new("club-c1", cache, || async { crash() });

    club.mount();
    let mut changed = false;
    for _ in 0..50 {
      if club.poll() {
        changed = true;
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(changed);
    assert!(matches!(club.state(), RenderState::Offline { .. }));
    assert_eq!(club.data(), Some(&chess()));
    assert_eq!(club.error(), None);
  }

  #[tokio::test]
  async fn test_refresh_keeps_abandoned_fetch_cache_write() {
    let (cache, _) = cache_with_store();
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(std::sync::Mutex::new(Some(gate)));
    let calls = Arc::new(AtomicU32::new(0));

    let mut notices = Resource::new("notices", cache.clone(), move || {
      let call = calls.fetch_add(1, Ordering::SeqCst);
      // Only the first fetch waits for the gate
      let gate = gate.lock().unwrap().take();
      async move {
        if let Some(gate) = gate {
          let _ = gate.await;
        }
        Ok::<_, UpstreamError>(vec![format!("fetch-{}", call)])
      }
    });

    notices.mount();
    notices.refresh();
    notices.settled().await;
    assert_eq!(notices.data(), Some(&vec!["fetch-1".to_string()]));

    release.send(()).unwrap();
    let mut cached = None;
    for _ in 0..50 {
      cached = cache.get::<Vec<String>>("notices").into_payload();
      if cached == Some(vec!["fetch-0".to_string()]) {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(cached, Some(vec!["fetch-0".to_string()]));
    // The abandoned fetch never renders
    assert!(!notices.poll());
    assert_eq!(notices.state(), &RenderState::Fresh(vec!["fetch-1".to_string()]));
  }

  #[test]
  fn test_label_defaults_to_key() {
    let (cache, _) = cache_with_store();
    let plain = Resource::new("events", cache.clone(), || async { Ok::<_, UpstreamError>(1) });
    let named = Resource::new("events", cache, || async { Ok::<_, UpstreamError>(1) })
      .with_label("upcoming events");

    assert_eq!(plain.label(), "events");
    assert_eq!(named.label(), "upcoming events");
  }
}
