//! Calendar export for events: an iCalendar document and a Google
//! Calendar "add event" link.

use chrono::{DateTime, Duration, Utc};
use url::Url;

use crate::hub::types::{Event, EventStatus};

const GOOGLE_CALENDAR: &str = "https://www.google.com/calendar/render";

/// iCalendar lines may not exceed this many octets before folding
const LINE_LIMIT: usize = 75;

/// Start and end of the event, or `None` if it has no date yet.
fn span(event: &Event) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
  let start = event.event_date?;
  let end = event
    .end_date
    .filter(|end| *end > start)
    .unwrap_or(start + default_length());
  Some((start, end))
}

/// Length assumed for events without an end date
fn default_length() -> Duration {
  Duration::hours(2)
}

fn utc_stamp(t: &DateTime<Utc>) -> String {
  t.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Render `event` as a single-event iCalendar document (RFC 5545).
///
/// Returns `None` for events without a date. `stamp` becomes DTSTAMP.
pub fn to_ics(event: &Event, stamp: DateTime<Utc>) -> Option<String> {
  let (start, end) = span(event)?;
  let status = if event.status == EventStatus::Cancelled {
    "CANCELLED"
  } else {
    "CONFIRMED"
  };

  let lines = [
    "BEGIN:VCALENDAR".to_string(),
    "VERSION:2.0".to_string(),
    "PRODID:-//EventHub//v1.0//EN".to_string(),
    "CALSCALE:GREGORIAN".to_string(),
    "METHOD:PUBLISH".to_string(),
    "BEGIN:VEVENT".to_string(),
    format!("UID:{}@eventhub", event.id),
    format!("SUMMARY:{}", escape_text(&event.title)),
    format!("DTSTAMP:{}", utc_stamp(&stamp)),
    format!("DTSTART:{}", utc_stamp(&start)),
    format!("DTEND:{}", utc_stamp(&end)),
    format!(
      "DESCRIPTION:{}",
      escape_text(event.description.as_deref().unwrap_or_default())
    ),
    format!(
      "LOCATION:{}",
      escape_text(event.location.as_deref().unwrap_or_default())
    ),
    format!("STATUS:{}", status),
    "SEQUENCE:0".to_string(),
    "END:VEVENT".to_string(),
    "END:VCALENDAR".to_string(),
  ];

  let mut out = String::new();
  for line in &lines {
    out.push_str(&fold(line));
    out.push_str("\r\n");
  }
  Some(out)
}

/// Link that opens Google Calendar's "add event" form prefilled with
/// `event`. Returns `None` for events without a date.
pub fn google_calendar_link(event: &Event) -> Option<String> {
  let (start, end) = span(event)?;
  let mut url = Url::parse(GOOGLE_CALENDAR).ok()?;
  url
    .query_pairs_mut()
    .append_pair("action", "TEMPLATE")
    .append_pair("text", &event.title)
    .append_pair(
      "dates",
      &format!("{}/{}", utc_stamp(&start), utc_stamp(&end)),
    )
    .append_pair("details", event.description.as_deref().unwrap_or_default())
    .append_pair("location", event.location.as_deref().unwrap_or_default())
    .append_pair("sf", "true")
    .append_pair("output", "xml");
  Some(url.into())
}

fn escape_text(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '\\' => out.push_str("\\\\"),
      ';' => out.push_str("\\;"),
      ',' => out.push_str("\\,"),
      '\n' => out.push_str("\\n"),
      '\r' => {}
      c => out.push(c),
    }
  }
  out
}

/// Split a content line into 75-octet pieces joined by CRLF + space,
/// never inside a UTF-8 sequence.
fn fold(line: &str) -> String {
  if line.len() <= LINE_LIMIT {
    return line.to_string();
  }

  let mut out = String::with_capacity(line.len() + line.len() / LINE_LIMIT * 3);
  let mut width = 0;
  for c in line.chars() {
    let len = c.len_utf8();
    if width + len > LINE_LIMIT {
      out.push_str("\r\n ");
      // The leading space counts towards the continuation line
      width = 1;
    }
    out.push(c);
    width += len;
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use serde_json::json;

  fn hackathon() -> Event {
    serde_json::from_value(json!({
      "id": "e1",
      "title": "Hackathon, round 2",
      "description": "Bring a laptop; food provided",
      "location": "Lab 3",
      "eventDate": "2026-11-01T09:00:00Z"
    }))
    .unwrap()
  }

  fn stamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
  }

  #[test]
  fn test_ics_defaults_to_two_hours() {
    let ics = to_ics(&hackathon(), stamp()).unwrap();

    assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
    assert!(ics.ends_with("END:VCALENDAR\r\n"));
    assert!(ics.contains("UID:e1@eventhub\r\n"));
    assert!(ics.contains("DTSTAMP:20261016T120000Z\r\n"));
    assert!(ics.contains("DTSTART:20261101T090000Z\r\n"));
    assert!(ics.contains("DTEND:20261101T110000Z\r\n"));
    assert!(ics.contains("SUMMARY:Hackathon\\, round 2\r\n"));
    assert!(ics.contains("DESCRIPTION:Bring a laptop\\; food provided\r\n"));
    assert!(ics.contains("STATUS:CONFIRMED\r\n"));
  }

  #[test]
  fn test_ics_uses_end_date_and_cancelled_status() {
    let mut event = hackathon();
    event.end_date = Some(Utc.with_ymd_and_hms(2026, 11, 2, 18, 0, 0).unwrap());
    event.status = EventStatus::Cancelled;

    let ics = to_ics(&event, stamp()).unwrap();
    assert!(ics.contains("DTEND:20261102T180000Z\r\n"));
    assert!(ics.contains("STATUS:CANCELLED\r\n"));
  }

  #[test]
  fn test_undated_event_cannot_be_exported() {
    let mut event = hackathon();
    event.event_date = None;
    assert_eq!(to_ics(&event, stamp()), None);
    assert_eq!(google_calendar_link(&event), None);
  }

  #[test]
  fn test_long_lines_are_folded() {
    let mut event = hackathon();
    event.description = Some("é".repeat(60));

    let ics = to_ics(&event, stamp()).unwrap();
    for line in ics.split("\r\n") {
      assert!(line.len() <= LINE_LIMIT, "{} octets: {}", line.len(), line);
    }
    let unfolded = ics.replace("\r\n ", "");
    assert!(unfolded.contains(&format!("DESCRIPTION:{}", "é".repeat(60))));
  }

  #[test]
  fn test_google_calendar_link() {
    let link = google_calendar_link(&hackathon()).unwrap();
    let url = Url::parse(&link).unwrap();
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

    assert_eq!(url.host_str(), Some("www.google.com"));
    assert!(pairs.contains(&("action".to_string(), "TEMPLATE".to_string())));
    assert!(pairs.contains(&("text".to_string(), "Hackathon, round 2".to_string())));
    assert!(pairs.contains(&(
      "dates".to_string(),
      "20261101T090000Z/20261101T110000Z".to_string()
    )));
    assert!(pairs.contains(&("location".to_string(), "Lab 3".to_string())));
  }
}
