pub mod auth;
pub mod list;
pub mod once;
pub mod run;

use anyhow::Result;
use calmirror_core::config::{CalendarSourceConfig, MirrorConfig};
use calmirror_core::feed::HttpFeed;
use calmirror_core::feed::fetch::DEFAULT_FETCH_TIMEOUT;
use calmirror_core::sync::Mirror;
use calmirror_core::token::FileTokenStore;
use calmirror_google::{GoogleCalendar, Session};

pub type GoogleMirror = Mirror<GoogleCalendar<Session<FileTokenStore>>, HttpFeed>;

/// The sync loop for the selected calendars, writing to Google Calendar.
pub fn build_mirror(config: &MirrorConfig, calendars: Vec<CalendarSourceConfig>) -> Result<GoogleMirror> {
    let backend = calmirror_google::backend(config)?;
    let feed = HttpFeed::new(DEFAULT_FETCH_TIMEOUT)?;
    Ok(Mirror::new(backend, feed, calendars))
}
