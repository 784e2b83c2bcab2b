use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use tracing::warn;

use crate::cache::{Lookup, OfflineCache};
use crate::calendar;
use crate::error::UpstreamError;
use crate::hub::types::{
  Club, ClubFields, Event, EventFields, EventStatus, NewNotification, Notice, NoticeFields,
};
use crate::hub::EventHub;
use crate::mutation::Optimistic;
use crate::render::{format_time, Render};
use crate::resource::{RenderState, Resource};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List upcoming events
  Events {
    /// Only the next few events
    #[arg(long, conflicts_with_all = ["past", "category"])]
    upcoming: bool,
    /// Events that already happened
    #[arg(long, conflicts_with = "category")]
    past: bool,
    #[arg(long)]
    category: Option<String>,
  },
  /// List clubs
  Clubs {
    #[arg(long, conflicts_with = "category")]
    featured: bool,
    #[arg(long)]
    category: Option<String>,
  },
  /// List notices
  Notices {
    /// Only the latest few notices
    #[arg(long, conflicts_with = "category")]
    latest: bool,
    #[arg(long)]
    category: Option<String>,
  },
  /// Show one event
  Event {
    id: String,
    /// Print the event as an iCalendar (.ics) document
    #[arg(long, conflicts_with = "calendar_link")]
    ics: bool,
    /// Print a link that adds the event to Google Calendar
    #[arg(long)]
    calendar_link: bool,
  },
  /// Show one club
  Club { id: String },
  /// Show one notice
  Notice { id: String },
  /// Events you registered for
  MyEvents,
  /// Clubs you are a member of
  MyClubs,
  /// Notices you saved
  SavedNotices,
  /// Your notifications
  Notifications,
  /// Join a club
  Join { club: String },
  /// Leave a club
  Leave { club: String },
  /// Register for an event
  Register { event: String },
  /// Cancel an event registration
  Unregister { event: String },
  /// Save a notice
  Save { notice: String },
  /// Remove a notice from your saved list
  Unsave { notice: String },
  /// Mark a notification as read
  Read { notification: String },
  /// Publish a notice
  Post {
    title: String,
    #[arg(long)]
    content: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    important: bool,
  },
  /// Delete a notice
  DeleteNotice { id: String },
  /// Publish, edit and moderate events, clubs and notices
  #[command(subcommand)]
  Admin(AdminCommand),
  /// Inspect or clear the offline cache
  #[command(subcommand)]
  Cache(CacheCommand),
  /// Sign out and clear all cached data
  Logout,
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
  /// Submit an event; it starts out pending
  CreateEvent {
    title: String,
    #[command(flatten)]
    fields: EventArgs,
  },
  /// Edit an event
  UpdateEvent {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[command(flatten)]
    fields: EventArgs,
  },
  /// Approve, reject, cancel or otherwise move an event along
  SetEventStatus { id: String, status: EventStatus },
  DeleteEvent { id: String },
  CreateClub {
    name: String,
    #[command(flatten)]
    fields: ClubArgs,
  },
  UpdateClub {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[command(flatten)]
    fields: ClubArgs,
  },
  DeleteClub { id: String },
  /// Edit a notice
  UpdateNotice {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    content: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    important: Option<bool>,
  },
  /// Send a notification to one user, or to everyone without --to
  Notify {
    title: String,
    #[arg(long)]
    message: Option<String>,
    #[arg(long)]
    to: Option<String>,
  },
}

#[derive(Args, Debug, Default)]
pub struct EventArgs {
  #[arg(long)]
  description: Option<String>,
  #[arg(long)]
  category: Option<String>,
  #[arg(long)]
  location: Option<String>,
  /// Start time, RFC 3339 (2026-11-01T09:00:00Z)
  #[arg(long)]
  date: Option<DateTime<Utc>>,
  /// End time, RFC 3339
  #[arg(long)]
  end: Option<DateTime<Utc>>,
  #[arg(long)]
  organizer: Option<String>,
  #[arg(long)]
  poster_url: Option<String>,
}

impl EventArgs {
  fn into_fields(self, title: Option<String>) -> EventFields {
    EventFields {
      title,
      description: self.description,
      category: self.category,
      location: self.location,
      event_date: self.date,
      end_date: self.end,
      organizer: self.organizer,
      poster_url: self.poster_url,
    }
  }
}

#[derive(Args, Debug, Default)]
pub struct ClubArgs {
  #[arg(long)]
  description: Option<String>,
  #[arg(long)]
  category: Option<String>,
  #[arg(long)]
  logo_url: Option<String>,
  #[arg(long)]
  featured: Option<bool>,
}

impl ClubArgs {
  fn into_fields(self, name: Option<String>) -> ClubFields {
    ClubFields {
      name,
      description: self.description,
      category: self.category,
      logo_url: self.logo_url,
      featured: self.featured,
    }
  }
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// List cached snapshots
  List,
  /// Print the snapshot stored under a key
  Get { key: String },
  /// Remove one snapshot, or all of them
  Clear { key: Option<String> },
}

impl Command {
  /// Whether the command needs the upstream at all.
  pub fn is_local(&self) -> bool {
    matches!(self, Command::Cache(_) | Command::Logout)
  }
}

/// Runs one command against the cache and, when needed, the upstream.
pub struct App {
  cache: OfflineCache,
  hub: Option<EventHub>,
  user: Option<String>,
}

impl App {
  pub fn new(cache: OfflineCache, hub: Option<EventHub>, user: Option<String>) -> Self {
    Self { cache, hub, user }
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Cache(cmd) => self.run_cache(cmd),
      Command::Logout => {
        self.cache.clear(None)?;
        println!("Signed out; cached data cleared.");
        Ok(())
      }
      Command::Admin(cmd) => self.run_admin(cmd).await,
      Command::Events {
        upcoming,
        past,
        category,
      } => {
        let hub = self.hub()?;
        if upcoming {
          show(hub.upcoming_events()).await
        } else if past {
          show(hub.past_events()).await
        } else {
          show(hub.events(category.as_deref())).await
        }
      }
      Command::Clubs { featured, category } => {
        let hub = self.hub()?;
        if featured {
          show(hub.featured_clubs()).await
        } else {
          show(hub.clubs(category.as_deref())).await
        }
      }
      Command::Notices { latest, category } => {
        let hub = self.hub()?;
        if latest {
          show(hub.latest_notices()).await
        } else {
          show(hub.notices(category.as_deref())).await
        }
      }
      Command::Event {
        id,
        ics,
        calendar_link,
      } => {
        let view = self.hub()?.event(&id);
        if ics || calendar_link {
          export_event(view, ics).await
        } else {
          show(view).await
        }
      }
      Command::Club { id } => show(self.hub()?.club(&id)).await,
      Command::Notice { id } => show(self.hub()?.notice(&id)).await,
      Command::MyEvents => show(self.hub()?.user_events(self.user()?)).await,
      Command::MyClubs => show(self.hub()?.user_clubs(self.user()?)).await,
      Command::SavedNotices => show(self.hub()?.saved_notices(self.user()?)).await,
      Command::Notifications => show(self.hub()?.notifications(self.user()?)).await,
      Command::Join { club } => {
        let (hub, user) = (self.hub()?, self.user()?);
        act(
          hub.club(&club),
          "join club",
          "member",
          |c: &Club| c.is_member(user),
          true,
          hub.join_club(&club, user),
        )
        .await
      }
      Command::Leave { club } => {
        let (hub, user) = (self.hub()?, self.user()?);
        act(
          hub.club(&club),
          "leave club",
          "member",
          |c: &Club| c.is_member(user),
          false,
          hub.leave_club(&club, user),
        )
        .await
      }
      Command::Register { event } => {
        let (hub, user) = (self.hub()?, self.user()?);
        act(
          hub.event(&event),
          "register for event",
          "registered",
          |e: &Event| e.is_registered(user),
          true,
          hub.register_for_event(&event, user),
        )
        .await
      }
      Command::Unregister { event } => {
        let (hub, user) = (self.hub()?, self.user()?);
        act(
          hub.event(&event),
          "unregister from event",
          "registered",
          |e: &Event| e.is_registered(user),
          false,
          hub.unregister_from_event(&event, user),
        )
        .await
      }
      Command::Save { notice } => {
        let (hub, user) = (self.hub()?, self.user()?);
        act(
          hub.notice(&notice),
          "save notice",
          "saved",
          |n: &Notice| n.is_saved_by(user),
          true,
          hub.save_notice(&notice, user),
        )
        .await
      }
      Command::Unsave { notice } => {
        let (hub, user) = (self.hub()?, self.user()?);
        act(
          hub.notice(&notice),
          "unsave notice",
          "saved",
          |n: &Notice| n.is_saved_by(user),
          false,
          hub.unsave_notice(&notice, user),
        )
        .await
      }
      Command::Read { notification } => {
        let (hub, user) = (self.hub()?, self.user()?);
        mutate_then_show(
          hub.notifications(user),
          "mark notification read",
          hub.mark_notification_read(&notification),
        )
        .await
      }
      Command::Post {
        title,
        content,
        category,
        important,
      } => {
        let hub = self.hub()?;
        let id = hub
          .post_notice(&NoticeFields {
            title: Some(title),
            content,
            category,
            important: Some(important),
          })
          .await
          .map_err(|e| eyre!("post notice failed: {}", e))?;
        println!("Posted notice {}", id);
        // Lists only pick the notice up on their next fetch
        show(hub.latest_notices()).await
      }
      Command::DeleteNotice { id } => {
        let hub = self.hub()?;
        mutate_then_show(hub.notices(None), "delete notice", hub.delete_notice(&id)).await
      }
    }
  }

  async fn run_admin(&self, command: AdminCommand) -> Result<()> {
    let hub = self.hub()?;
    match command {
      AdminCommand::CreateEvent { title, fields } => {
        let id = hub
          .create_event(&fields.into_fields(Some(title)))
          .await
          .map_err(|e| eyre!("create event failed: {}", e))?;
        println!("Submitted event {} for review", id);
        show(hub.event(&id)).await
      }
      AdminCommand::UpdateEvent { id, title, fields } => {
        let op = hub.update_event(&id, &fields.into_fields(title));
        mutate_then_show(hub.event(&id), "update event", op).await
      }
      AdminCommand::SetEventStatus { id, status } => {
        let op = hub.change_event_status(&id, status);
        mutate_then_show(hub.event(&id), &format!("mark event {}", status), op).await
      }
      AdminCommand::DeleteEvent { id } => {
        mutate_then_show(hub.events(None), "delete event", hub.delete_event(&id)).await
      }
      AdminCommand::CreateClub { name, fields } => {
        let id = hub
          .create_club(&fields.into_fields(Some(name)))
          .await
          .map_err(|e| eyre!("create club failed: {}", e))?;
        println!("Created club {}", id);
        show(hub.club(&id)).await
      }
      AdminCommand::UpdateClub { id, name, fields } => {
        let op = hub.update_club(&id, &fields.into_fields(name));
        mutate_then_show(hub.club(&id), "update club", op).await
      }
      AdminCommand::DeleteClub { id } => {
        mutate_then_show(hub.clubs(None), "delete club", hub.delete_club(&id)).await
      }
      AdminCommand::UpdateNotice {
        id,
        title,
        content,
        category,
        important,
      } => {
        let fields = NoticeFields {
          title,
          content,
          category,
          important,
        };
        let op = hub.update_notice(&id, &fields);
        mutate_then_show(hub.notice(&id), "update notice", op).await
      }
      AdminCommand::Notify { title, message, to } => {
        let id = hub
          .send_notification(&NewNotification {
            user_id: to.clone(),
            title,
            message,
          })
          .await
          .map_err(|e| eyre!("send notification failed: {}", e))?;
        println!("Sent notification {}", id);
        match to {
          Some(user) => show(hub.notifications(&user)).await,
          None => Ok(()),
        }
      }
    }
  }

  fn run_cache(&self, command: CacheCommand) -> Result<()> {
    match command {
      CacheCommand::List => {
        let entries = self.cache.entries()?;
        if entries.is_empty() {
          println!("Cache is empty.");
          return Ok(());
        }
        println!(
          "{} entries, expiring after {}h",
          entries.len(),
          self.cache.max_age().num_hours()
        );
        for entry in entries {
          println!(
            "{:<28} {}  {:>8} B{}",
            entry.key,
            format_time(&entry.captured_at),
            entry.bytes,
            if entry.expired { "  (expired)" } else { "" }
          );
        }
        Ok(())
      }
      CacheCommand::Get { key } => match self.cache.get::<serde_json::Value>(&key) {
        Lookup::Hit(entry) => {
          println!("# {} (cached {})", key, format_time(&entry.captured_at));
          println!("{}", serde_json::to_string_pretty(&entry.payload)?);
          Ok(())
        }
        Lookup::Miss(reason) => Err(eyre!("No usable entry for {} ({:?})", key, reason)),
      },
      CacheCommand::Clear { key } => {
        self.cache.clear(key.as_deref())?;
        match key {
          Some(key) => println!("Cleared {}.", key),
          None => println!("Cleared all cached data."),
        }
        Ok(())
      }
    }
  }

  fn hub(&self) -> Result<&EventHub> {
    self.hub.as_ref().ok_or_else(|| {
      eyre!(
        "No upstream URL configured. Set upstream.url in eventhub.yaml, \
         pass --url or set EVENTHUB_URL."
      )
    })
  }

  fn user(&self) -> Result<&str> {
    self
      .user
      .as_deref()
      .ok_or_else(|| eyre!("This command needs a user. Pass --user or set EVENTHUB_USER."))
  }
}

/// Mount a view, print the cached snapshot if there is one, then the
/// outcome of the fetch.
async fn show<T>(mut view: Resource<T>) -> Result<()>
where
  T: Render + Serialize + DeserializeOwned + Send + 'static,
{
  view.mount();
  if view.state().is_loading() {
    eprintln!("Loading {}...", view.label());
  } else if let RenderState::Revalidating { data, captured_at } = view.state() {
    println!(
      "== {} (cached {}, refreshing)",
      view.label(),
      format_time(captured_at)
    );
    print_lines(data);
  }
  print_settled(&mut view).await
}

async fn print_settled<T>(view: &mut Resource<T>) -> Result<()>
where
  T: Render + Serialize + DeserializeOwned + Send + 'static,
{
  view.settled().await;
  let title = view.label();
  match view.state() {
    RenderState::Fresh(data) => {
      match view.fetched_at() {
        Some(at) => println!("== {} (fetched {})", title, format_time(&at)),
        None => println!("== {}", title),
      }
      print_lines(data);
      Ok(())
    }
    RenderState::Offline {
      data,
      captured_at,
      error,
    } => {
      eprintln!(
        "Offline ({}); showing {} as cached at {}",
        error,
        title,
        format_time(captured_at)
      );
      print_lines(data);
      Ok(())
    }
    RenderState::Error(message) => Err(eyre!("Failed to load {}: {}", title, message)),
    state => Err(eyre!("{} did not settle ({})", title, state_name(state))),
  }
}

/// Load the view, run `op` against it, then show the refetched view.
async fn mutate_then_show<T, Fut>(mut view: Resource<T>, action: &str, op: Fut) -> Result<()>
where
  T: Render + Serialize + DeserializeOwned + Send + 'static,
  Fut: Future<Output = Result<(), UpstreamError>>,
{
  view.mount();
  view.settled().await;
  view.mutate(action, op).await?;
  println!("Done: {}", action);
  print_settled(&mut view).await
}

/// Load the view, flip a flag optimistically while `op` runs, then show
/// the refetched view.
async fn act<T, F, Fut>(
  mut view: Resource<T>,
  action: &str,
  flag_name: &str,
  state_of: F,
  target: bool,
  op: Fut,
) -> Result<()>
where
  T: Render + Serialize + DeserializeOwned + Send + 'static,
  F: Fn(&T) -> bool,
  Fut: Future<Output = Result<(), UpstreamError>>,
{
  view.mount();
  view.settled().await;

  let mut flag = Optimistic::new(view.data().map(&state_of).unwrap_or(!target));
  println!(
    "{}: {} {} -> {} (pending)",
    action,
    flag_name,
    yes_no(*flag.get()),
    yes_no(target)
  );
  if let Err(e) = flag.apply(target, view.mutate(action, op)).await {
    eprintln!("{}: {} rolled back to {}", action, flag_name, yes_no(*flag.get()));
    return Err(e.into());
  }
  println!("Done: {}", action);

  print_settled(&mut view).await?;
  if view.state().is_stale() {
    eprintln!("The {} shown above predates this change.", view.label());
  } else if let Some(data) = view.data() {
    if state_of(data) != *flag.get() {
      warn!(action, "upstream does not reflect the change yet");
    }
  }
  Ok(())
}

/// Print an event as iCalendar or as a Google Calendar link.
async fn export_event(mut view: Resource<Event>, ics: bool) -> Result<()> {
  view.mount();
  view.settled().await;
  if let Some(message) = view.error() {
    return Err(eyre!("Failed to load {}: {}", view.label(), message));
  }
  let event = view
    .data()
    .ok_or_else(|| eyre!("{} did not load", view.label()))?;
  if view.state().is_stale() {
    eprintln!("Offline; exporting {} as cached.", view.label());
  }

  let exported = if ics {
    calendar::to_ics(event, Utc::now())
  } else {
    calendar::google_calendar_link(event)
  };
  let exported = exported.ok_or_else(|| eyre!("Event {} has no date to export", event.id))?;
  if ics {
    print!("{}", exported);
  } else {
    println!("{}", exported);
  }
  Ok(())
}

fn print_lines<T: Render>(data: &T) {
  for line in data.lines() {
    println!("  {}", line);
  }
}

fn yes_no(value: bool) -> &'static str {
  if value {
    "yes"
  } else {
    "no"
  }
}

fn state_name<T>(state: &RenderState<T>) -> &'static str {
  match state {
    RenderState::Idle => "idle",
    RenderState::Loading => "loading",
    RenderState::Revalidating { .. } => "revalidating",
    RenderState::Fresh(_) => "fresh",
    RenderState::Offline { .. } => "offline",
    RenderState::Error(_) => "error",
  }
}
