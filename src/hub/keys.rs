//! Cache keys for hub resources.

use std::fmt;

/// Logical resources a view can show.
///
/// The rendered keys match the ones earlier clients wrote, so existing
/// snapshots stay readable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKey {
  /// Upcoming events, optionally filtered by category
  Events { category: Option<String> },
  /// Short upcoming-events strip for the home view
  UpcomingEvents,
  /// Most recent past events
  PastEvents,
  Clubs { category: Option<String> },
  FeaturedClubs,
  Notices { category: Option<String> },
  LatestNotices,
  Event { id: String },
  Club { id: String },
  Notice { id: String },
  /// Events a user registered for
  UserEvents { user_id: String },
  /// Clubs a user is a member of
  UserClubs { user_id: String },
  /// Notices a user saved
  UserNotices { user_id: String },
  Notifications { user_id: String },
}

impl ResourceKey {
  pub fn events(category: Option<&str>) -> Self {
    Self::Events {
      category: normalize_category(category),
    }
  }

  pub fn clubs(category: Option<&str>) -> Self {
    Self::Clubs {
      category: normalize_category(category),
    }
  }

  pub fn notices(category: Option<&str>) -> Self {
    Self::Notices {
      category: normalize_category(category),
    }
  }

  /// Category the list is filtered by. The upstream filter must use exactly
  /// this value so that the key names one query.
  pub fn category(&self) -> Option<&str> {
    match self {
      Self::Events { category } | Self::Clubs { category } | Self::Notices { category } => {
        category.as_deref()
      }
      _ => None,
    }
  }

  /// The string the snapshot is stored under.
  pub fn cache_key(&self) -> String {
    match self {
      Self::Events { category } => with_category("events", category),
      Self::UpcomingEvents => "upcomingEvents".to_string(),
      Self::PastEvents => "pastEvents".to_string(),
      Self::Clubs { category } => with_category("clubs", category),
      Self::FeaturedClubs => "featuredClubs".to_string(),
      Self::Notices { category } => with_category("notices", category),
      Self::LatestNotices => "latestNotices".to_string(),
      Self::Event { id } => format!("event-{}", id),
      Self::Club { id } => format!("club-{}", id),
      Self::Notice { id } => format!("notice-{}", id),
      Self::UserEvents { user_id } => format!("user-events-{}", user_id),
      Self::UserClubs { user_id } => format!("user-clubs-{}", user_id),
      Self::UserNotices { user_id } => format!("user-notices-{}", user_id),
      Self::Notifications { user_id } => format!("notifications-{}", user_id),
    }
  }

  /// Human-readable label for headings and log lines.
  pub fn description(&self) -> String {
    match self {
      Self::Events { category: None } => "upcoming events".to_string(),
      Self::Events {
        category: Some(c),
      } => format!("upcoming {} events", c),
      Self::UpcomingEvents => "next events".to_string(),
      Self::PastEvents => "past events".to_string(),
      Self::Clubs { category: None } => "all clubs".to_string(),
      Self::Clubs {
        category: Some(c),
      } => format!("{} clubs", c),
      Self::FeaturedClubs => "featured clubs".to_string(),
      Self::Notices { category: None } => "all notices".to_string(),
      Self::Notices {
        category: Some(c),
      } => format!("{} notices", c),
      Self::LatestNotices => "latest notices".to_string(),
      Self::Event { id } => format!("event {}", id),
      Self::Club { id } => format!("club {}", id),
      Self::Notice { id } => format!("notice {}", id),
      Self::UserEvents { user_id } => format!("events of {}", user_id),
      Self::UserClubs { user_id } => format!("clubs of {}", user_id),
      Self::UserNotices { user_id } => format!("notices saved by {}", user_id),
      Self::Notifications { user_id } => format!("notifications for {}", user_id),
    }
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.cache_key())
  }
}

/// Trim a user-supplied category; blank means unfiltered. Case is kept,
/// the upstream compares categories exactly.
fn normalize_category(category: Option<&str>) -> Option<String> {
  category
    .map(str::trim)
    .filter(|c| !c.is_empty())
    .map(String::from)
}

/// Category-filtered lists get their own snapshot.
fn with_category(base: &str, category: &Option<String>) -> String {
  match category {
    Some(c) => format!("{}-{}", base, c),
    None => base.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keys_match_stored_names() {
    assert_eq!(ResourceKey::Events { category: None }.cache_key(), "events");
    assert_eq!(ResourceKey::FeaturedClubs.cache_key(), "featuredClubs");
    assert_eq!(
      ResourceKey::Club {
        id: "c1".to_string()
      }
      .cache_key(),
      "club-c1"
    );
  }

  #[test]
  fn test_blank_category_is_unfiltered() {
    for blank in [Some(""), Some("   "), None] {
      let key = ResourceKey::events(blank);
      assert_eq!(key.cache_key(), "events");
      assert_eq!(key.category(), None);
    }
  }

  #[test]
  fn test_category_key_matches_filter_value() {
    let padded = ResourceKey::clubs(Some(" Tech "));
    assert_eq!(padded.cache_key(), "clubs-Tech");
    assert_eq!(padded.category(), Some("Tech"));

    // Different filter values must not share a snapshot
    let lower = ResourceKey::clubs(Some("tech"));
    assert_ne!(padded.cache_key(), lower.cache_key());
    assert_eq!(lower.category(), Some("tech"));
  }

  #[test]
  fn test_descriptions_name_the_category() {
    assert_eq!(
      ResourceKey::events(Some("Workshop")).description(),
      "upcoming Workshop events"
    );
    assert_eq!(ResourceKey::notices(None).description(), "all notices");
    assert_eq!(ResourceKey::PastEvents.cache_key(), "pastEvents");
  }
}
