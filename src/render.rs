//! Plain-text rendering of hub records for the terminal.

use chrono::{DateTime, Local, Utc};

use crate::hub::types::{Club, Event, EventStatus, Notice, Notification};

/// One-line form used in list views
pub trait Summary {
  fn summary(&self) -> String;
}

/// Lines printed for a view's data
pub trait Render {
  fn lines(&self) -> Vec<String>;
}

impl<T: Summary> Render for Vec<T> {
  fn lines(&self) -> Vec<String> {
    if self.is_empty() {
      return vec!["(nothing here)".to_string()];
    }
    self.iter().map(Summary::summary).collect()
  }
}

pub fn format_time(t: &DateTime<Utc>) -> String {
  t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn or_dash(value: &Option<String>) -> &str {
  value.as_deref().unwrap_or("-")
}

impl Summary for Event {
  fn summary(&self) -> String {
    let when = self
      .event_date
      .as_ref()
      .map(format_time)
      .unwrap_or_else(|| "TBA".to_string());
    let mut line = format!("{:<12} {}  {}", self.id, when, self.title);
    if let Some(location) = &self.location {
      line.push_str(&format!(" @ {}", location));
    }
    if matches!(
      self.status,
      EventStatus::Pending | EventStatus::Rejected | EventStatus::Cancelled
    ) {
      line.push_str(&format!(" [{}]", self.status));
    }
    line
  }
}

impl Render for Event {
  fn lines(&self) -> Vec<String> {
    let mut lines = vec![
      self.title.clone(),
      format!(
        "When: {}",
        self
          .event_date
          .as_ref()
          .map(format_time)
          .unwrap_or_else(|| "TBA".to_string())
      ),
    ];
    if let Some(end) = &self.end_date {
      lines.push(format!("Until: {}", format_time(end)));
    }
    lines.extend([
      format!("Where: {}", or_dash(&self.location)),
      format!("Category: {}", or_dash(&self.category)),
      format!("Organizer: {}", or_dash(&self.organizer)),
      format!("Status: {}", self.status),
      format!("Registered: {}", self.registered_users.len()),
    ]);
    if let Some(description) = &self.description {
      lines.push(String::new());
      lines.push(description.clone());
    }
    lines
  }
}

impl Summary for Club {
  fn summary(&self) -> String {
    let star = if self.featured { "*" } else { " " };
    format!(
      "{:<12} {}{}  ({} members)",
      self.id,
      star,
      self.name,
      self.members.len()
    )
  }
}

impl Render for Club {
  fn lines(&self) -> Vec<String> {
    let mut lines = vec![
      self.name.clone(),
      format!("Category: {}", or_dash(&self.category)),
      format!("Members: {}", self.members.len()),
    ];
    if let Some(description) = &self.description {
      lines.push(String::new());
      lines.push(description.clone());
    }
    lines
  }
}

impl Summary for Notice {
  fn summary(&self) -> String {
    let flag = if self.important { "!" } else { " " };
    let when = self
      .created_at
      .as_ref()
      .map(format_time)
      .unwrap_or_default();
    format!("{:<12} {}{}  {}", self.id, flag, when, self.title)
  }
}

impl Render for Notice {
  fn lines(&self) -> Vec<String> {
    let mut lines = vec![self.title.clone()];
    if self.important {
      lines.push("Important".to_string());
    }
    lines.push(format!("Category: {}", or_dash(&self.category)));
    if let Some(created_at) = &self.created_at {
      lines.push(format!("Posted: {}", format_time(created_at)));
    }
    if let Some(content) = &self.content {
      lines.push(String::new());
      lines.push(content.clone());
    }
    lines
  }
}

impl Summary for Notification {
  fn summary(&self) -> String {
    let unread = if self.read { " " } else { "*" };
    let mut line = format!("{:<12} {}{}", self.id, unread, self.title);
    if let Some(message) = &self.message {
      line.push_str(&format!(": {}", message));
    }
    line
  }
}
