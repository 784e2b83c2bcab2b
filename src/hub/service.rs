//! Hub service that binds resource keys to upstream reads and writes.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use tracing::debug;

use crate::cache::OfflineCache;
use crate::error::UpstreamError;
use crate::resource::Resource;

use super::client::{Direction, FilterOp, ListQuery, UpstreamClient};
use super::keys::ResourceKey;
use super::types::{
  Club, ClubFields, Event, EventFields, EventStatus, NewNotification, Notice, NoticeFields,
  Notification,
};

const EVENTS: &str = "events";
const CLUBS: &str = "clubs";
const NOTICES: &str = "notices";
const NOTIFICATIONS: &str = "notifications";

const LIST_LIMIT: u32 = 50;
const HOME_LIMIT: u32 = 10;
const PAST_LIMIT: u32 = 20;

/// Entry point for views and actions.
///
/// Views are handed out as unmounted `Resource`s that share this hub's
/// cache. Actions go straight to the upstream and never touch the cache;
/// the view that shows the changed data refreshes afterwards.
#[derive(Clone)]
pub struct EventHub {
  client: UpstreamClient,
  cache: OfflineCache,
}

impl EventHub {
  pub fn new(client: UpstreamClient, cache: OfflineCache) -> Self {
    Self { client, cache }
  }

  pub fn cache(&self) -> &OfflineCache {
    &self.cache
  }

  /// Upcoming events, soonest first.
  pub fn events(&self, category: Option<&str>) -> Resource<Vec<Event>> {
    let key = ResourceKey::events(category);
    let query = with_category(upcoming().limit(LIST_LIMIT), &key);
    self.list(key, EVENTS, query)
  }

  pub fn upcoming_events(&self) -> Resource<Vec<Event>> {
    self.list(
      ResourceKey::UpcomingEvents,
      EVENTS,
      upcoming().limit(HOME_LIMIT),
    )
  }

  /// Events that already happened, most recent first.
  pub fn past_events(&self) -> Resource<Vec<Event>> {
    self.list(
      ResourceKey::PastEvents,
      EVENTS,
      ListQuery::new()
        .filter("eventDate", FilterOp::Lt, Utc::now().to_rfc3339())
        .order_by("eventDate", Direction::Desc)
        .limit(PAST_LIMIT),
    )
  }

  pub fn event(&self, id: &str) -> Resource<Event> {
    self.one(ResourceKey::Event { id: id.to_string() }, EVENTS, id)
  }

  /// Clubs by name.
  pub fn clubs(&self, category: Option<&str>) -> Resource<Vec<Club>> {
    let key = ResourceKey::clubs(category);
    let query = with_category(
      ListQuery::new()
        .order_by("name", Direction::Asc)
        .limit(LIST_LIMIT),
      &key,
    );
    self.list(key, CLUBS, query)
  }

  pub fn featured_clubs(&self) -> Resource<Vec<Club>> {
    self.list(
      ResourceKey::FeaturedClubs,
      CLUBS,
      ListQuery::new()
        .order_by("name", Direction::Asc)
        .limit(HOME_LIMIT),
    )
  }

  pub fn club(&self, id: &str) -> Resource<Club> {
    self.one(ResourceKey::Club { id: id.to_string() }, CLUBS, id)
  }

  /// Notices, newest first.
  pub fn notices(&self, category: Option<&str>) -> Resource<Vec<Notice>> {
    let key = ResourceKey::notices(category);
    let query = with_category(
      ListQuery::new()
        .order_by("createdAt", Direction::Desc)
        .limit(LIST_LIMIT),
      &key,
    );
    self.list(key, NOTICES, query)
  }

  pub fn latest_notices(&self) -> Resource<Vec<Notice>> {
    self.list(
      ResourceKey::LatestNotices,
      NOTICES,
      ListQuery::new()
        .order_by("createdAt", Direction::Desc)
        .limit(HOME_LIMIT),
    )
  }

  pub fn notice(&self, id: &str) -> Resource<Notice> {
    self.one(ResourceKey::Notice { id: id.to_string() }, NOTICES, id)
  }

  pub fn user_events(&self, user_id: &str) -> Resource<Vec<Event>> {
    self.list(
      ResourceKey::UserEvents {
        user_id: user_id.to_string(),
      },
      EVENTS,
      ListQuery::new()
        .filter("registeredUsers", FilterOp::Contains, user_id)
        .order_by("eventDate", Direction::Asc),
    )
  }

  pub fn user_clubs(&self, user_id: &str) -> Resource<Vec<Club>> {
    self.list(
      ResourceKey::UserClubs {
        user_id: user_id.to_string(),
      },
      CLUBS,
      ListQuery::new()
        .filter("members", FilterOp::Contains, user_id)
        .order_by("name", Direction::Asc),
    )
  }

  pub fn saved_notices(&self, user_id: &str) -> Resource<Vec<Notice>> {
    self.list(
      ResourceKey::UserNotices {
        user_id: user_id.to_string(),
      },
      NOTICES,
      ListQuery::new()
        .filter("savedBy", FilterOp::Contains, user_id)
        .order_by("createdAt", Direction::Desc),
    )
  }

  pub fn notifications(&self, user_id: &str) -> Resource<Vec<Notification>> {
    self.list(
      ResourceKey::Notifications {
        user_id: user_id.to_string(),
      },
      NOTIFICATIONS,
      ListQuery::new()
        .filter("userId", FilterOp::Eq, user_id)
        .order_by("timestamp", Direction::Desc),
    )
  }

  // Membership, registration and bookmarks

  pub fn join_club(
    &self,
    club_id: &str,
    user_id: &str,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    let client = self.client.clone();
    let (club_id, user_id) = (club_id.to_string(), user_id.to_string());
    async move {
      let club: Club = client.get(CLUBS, &club_id).await?;
      if club.is_member(&user_id) {
        return Err(UpstreamError::Rejected(
          "User is already a member of this club".to_string(),
        ));
      }
      client.array_union(CLUBS, &club_id, "members", &user_id).await
    }
  }

  pub fn leave_club(
    &self,
    club_id: &str,
    user_id: &str,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    let client = self.client.clone();
    let (club_id, user_id) = (club_id.to_string(), user_id.to_string());
    async move {
      client
        .array_remove(CLUBS, &club_id, "members", &user_id)
        .await
    }
  }

  pub fn register_for_event(
    &self,
    event_id: &str,
    user_id: &str,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    let client = self.client.clone();
    let (event_id, user_id) = (event_id.to_string(), user_id.to_string());
    async move {
      let event: Event = client.get(EVENTS, &event_id).await?;
      if event.is_registered(&user_id) {
        return Err(UpstreamError::Rejected(
          "User already registered for this event".to_string(),
        ));
      }
      client
        .array_union(EVENTS, &event_id, "registeredUsers", &user_id)
        .await
    }
  }

  pub fn unregister_from_event(
    &self,
    event_id: &str,
    user_id: &str,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    let client = self.client.clone();
    let (event_id, user_id) = (event_id.to_string(), user_id.to_string());
    async move {
      client
        .array_remove(EVENTS, &event_id, "registeredUsers", &user_id)
        .await
    }
  }

  pub fn save_notice(
    &self,
    notice_id: &str,
    user_id: &str,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    let client = self.client.clone();
    let (notice_id, user_id) = (notice_id.to_string(), user_id.to_string());
    async move {
      client
        .array_union(NOTICES, &notice_id, "savedBy", &user_id)
        .await
    }
  }

  pub fn unsave_notice(
    &self,
    notice_id: &str,
    user_id: &str,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    let client = self.client.clone();
    let (notice_id, user_id) = (notice_id.to_string(), user_id.to_string());
    async move {
      client
        .array_remove(NOTICES, &notice_id, "savedBy", &user_id)
        .await
    }
  }

  pub fn mark_notification_read(
    &self,
    notification_id: &str,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    self.update(NOTIFICATIONS, notification_id, Ok(json!({ "read": true })))
  }

  // Publishing and moderation

  /// Submit an event for moderation and return its id.
  pub async fn create_event(&self, fields: &EventFields) -> Result<String, UpstreamError> {
    let mut doc = stamped(fields, true)?;
    doc["status"] = json!(EventStatus::Pending);
    doc["registeredUsers"] = json!([]);
    self.client.create(EVENTS, &doc).await
  }

  pub fn update_event(
    &self,
    event_id: &str,
    fields: &EventFields,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    self.update(EVENTS, event_id, stamped(fields, false))
  }

  /// Approve, reject, cancel or otherwise move an event along.
  pub fn change_event_status(
    &self,
    event_id: &str,
    status: EventStatus,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    self.update(EVENTS, event_id, stamped(&json!({ "status": status }), false))
  }

  pub fn delete_event(
    &self,
    event_id: &str,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    self.delete(EVENTS, event_id)
  }

  /// Create a club with no members and return its id.
  pub async fn create_club(&self, fields: &ClubFields) -> Result<String, UpstreamError> {
    let mut doc = stamped(fields, true)?;
    doc["members"] = json!([]);
    self.client.create(CLUBS, &doc).await
  }

  pub fn update_club(
    &self,
    club_id: &str,
    fields: &ClubFields,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    self.update(CLUBS, club_id, stamped(fields, false))
  }

  pub fn delete_club(
    &self,
    club_id: &str,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    self.delete(CLUBS, club_id)
  }

  /// Publish a notice and return its id.
  pub async fn post_notice(&self, fields: &NoticeFields) -> Result<String, UpstreamError> {
    let doc = stamped(fields, true)?;
    self.client.create(NOTICES, &doc).await
  }

  pub fn update_notice(
    &self,
    notice_id: &str,
    fields: &NoticeFields,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    self.update(NOTICES, notice_id, stamped(fields, false))
  }

  pub fn delete_notice(
    &self,
    notice_id: &str,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    self.delete(NOTICES, notice_id)
  }

  /// Deliver an unread notification and return its id.
  pub async fn send_notification(
    &self,
    notification: &NewNotification,
  ) -> Result<String, UpstreamError> {
    let mut doc = to_document(notification)?;
    doc["timestamp"] = json!(Utc::now());
    doc["read"] = json!(false);
    self.client.create(NOTIFICATIONS, &doc).await
  }

  fn list<T>(&self, key: ResourceKey, collection: &'static str, query: ListQuery) -> Resource<Vec<T>>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
  {
    debug!(key = %key, label = %key.description(), "list view");
    let client = self.client.clone();
    Resource::new(key.cache_key(), self.cache.clone(), move || {
      let client = client.clone();
      let query = query.clone();
      async move { client.list::<T>(collection, &query).await }
    })
    .with_label(key.description())
  }

  fn one<T>(&self, key: ResourceKey, collection: &'static str, id: &str) -> Resource<T>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
  {
    debug!(key = %key, label = %key.description(), "detail view");
    let client = self.client.clone();
    let id = id.to_string();
    Resource::new(key.cache_key(), self.cache.clone(), move || {
      let client = client.clone();
      let id = id.clone();
      async move { client.get::<T>(collection, &id).await }
    })
    .with_label(key.description())
  }

  fn update(
    &self,
    collection: &'static str,
    id: &str,
    doc: Result<Value, UpstreamError>,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    let client = self.client.clone();
    let id = id.to_string();
    async move { client.update(collection, &id, &doc?).await }
  }

  fn delete(
    &self,
    collection: &'static str,
    id: &str,
  ) -> impl Future<Output = Result<(), UpstreamError>> + Send + 'static {
    let client = self.client.clone();
    let id = id.to_string();
    async move { client.delete(collection, &id).await }
  }
}

/// Events dated from now on, soonest first.
fn upcoming() -> ListQuery {
  ListQuery::new()
    .filter("eventDate", FilterOp::Gte, Utc::now().to_rfc3339())
    .order_by("eventDate", Direction::Asc)
}

/// Filter by the key's own category so the snapshot and the query agree.
fn with_category(query: ListQuery, key: &ResourceKey) -> ListQuery {
  match key.category() {
    Some(category) => query.filter("category", FilterOp::Eq, category),
    None => query,
  }
}

fn to_document<T: Serialize>(fields: &T) -> Result<Value, UpstreamError> {
  match serde_json::to_value(fields) {
    Ok(doc @ Value::Object(_)) => Ok(doc),
    Ok(other) => Err(UpstreamError::Decode(format!(
      "expected a document, got {}",
      other
    ))),
    Err(e) => Err(UpstreamError::Decode(e.to_string())),
  }
}

/// Document for a write: the fields plus `updatedAt`, and `createdAt` for
/// new documents.
fn stamped<T: Serialize>(fields: &T, created: bool) -> Result<Value, UpstreamError> {
  let mut doc = to_document(fields)?;
  let now = json!(Utc::now());
  if created {
    doc["createdAt"] = now.clone();
  }
  doc["updatedAt"] = now;
  Ok(doc)
}
