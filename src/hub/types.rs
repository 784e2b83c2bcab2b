use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Campus event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub location: Option<String>,
  #[serde(default)]
  pub event_date: Option<DateTime<Utc>>,
  #[serde(default)]
  pub end_date: Option<DateTime<Utc>>,
  #[serde(default)]
  pub organizer: Option<String>,
  #[serde(default)]
  pub status: EventStatus,
  #[serde(default)]
  pub registered_users: Vec<String>,
  #[serde(default)]
  pub poster_url: Option<String>,
}

impl Event {
  pub fn is_registered(&self, user_id: &str) -> bool {
    self.registered_users.iter().any(|u| u == user_id)
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
  /// Submitted, waiting for moderation
  Pending,
  Approved,
  Rejected,
  #[default]
  Upcoming,
  Ongoing,
  Completed,
  Cancelled,
}

impl EventStatus {
  pub const ALL: [EventStatus; 7] = [
    EventStatus::Pending,
    EventStatus::Approved,
    EventStatus::Rejected,
    EventStatus::Upcoming,
    EventStatus::Ongoing,
    EventStatus::Completed,
    EventStatus::Cancelled,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      EventStatus::Pending => "pending",
      EventStatus::Approved => "approved",
      EventStatus::Rejected => "rejected",
      EventStatus::Upcoming => "upcoming",
      EventStatus::Ongoing => "ongoing",
      EventStatus::Completed => "completed",
      EventStatus::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for EventStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EventStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim().to_lowercase();
    Self::ALL
      .into_iter()
      .find(|status| status.as_str() == wanted)
      .ok_or_else(|| {
        let known: Vec<&str> = Self::ALL.iter().map(|s| s.as_str()).collect();
        format!("unknown event status '{}' (expected one of {})", s, known.join(", "))
      })
  }
}

/// Student club
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Club {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub logo_url: Option<String>,
  #[serde(default)]
  pub members: Vec<String>,
  #[serde(default)]
  pub featured: bool,
}

impl Club {
  pub fn is_member(&self, user_id: &str) -> bool {
    self.members.iter().any(|m| m == user_id)
  }
}

/// Notice board post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub content: Option<String>,
  #[serde(default)]
  pub category: Option<String>,
  #[serde(default)]
  pub important: bool,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub saved_by: Vec<String>,
}

impl Notice {
  pub fn is_saved_by(&self, user_id: &str) -> bool {
    self.saved_by.iter().any(|u| u == user_id)
  }
}

/// In-app notification addressed to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub user_id: Option<String>,
  #[serde(default)]
  pub timestamp: Option<DateTime<Utc>>,
  #[serde(default)]
  pub read: bool,
}

// Write payloads. Unset fields are left out of the document, so the same
// struct serves for creating and for merge-updating.

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFields {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub event_date: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub end_date: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub organizer: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub poster_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubFields {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub logo_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub featured: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeFields {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub important: Option<bool>,
}

/// Notification to deliver; without a user it is a broadcast
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}
