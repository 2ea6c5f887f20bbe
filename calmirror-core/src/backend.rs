//! The seam between reconciliation and a remote calendar service.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::destination::{DestinationEvent, DestinationInstance};
use crate::error::SyncResult;
use crate::event::{EventTime, InstanceKey, InstanceOverride, NormalizedEvent};
use crate::window::SyncWindow;

/// Private extended property holding the feed url an event was mirrored from.
pub const SOURCE_PROPERTY: &str = "calmirrorSource";
/// Private extended property holding the external UID.
pub const UID_PROPERTY: &str = "calmirrorUid";
/// Private extended property listing instances cancelled because the feed declined them.
pub const SOURCE_DECLINED_PROPERTY: &str = "calmirrorSourceDeclined";

/// Which remote calendar a feed is mirrored into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub calendar_id: String,
    /// Feed url; only events tagged with it are listed or touched
    pub source_url: String,
}

/// Everything written to a destination series.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    pub uid: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub timezone: Option<String>,
    pub recurrence: Vec<String>,
    pub source_declined: BTreeSet<InstanceKey>,
}

impl EventPayload {
    pub fn from_source(event: &NormalizedEvent, source_declined: BTreeSet<InstanceKey>) -> Self {
        EventPayload {
            uid: event.uid.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start: event.start,
            end: event.end,
            timezone: event.timezone.clone(),
            recurrence: event.recurrence.clone(),
            source_declined,
        }
    }

    /// Zone sent with timed values. All-day events carry none.
    pub fn effective_timezone(&self) -> Option<&str> {
        effective_timezone(&self.start, self.timezone.as_deref())
    }

    /// Whether the destination already shows this content. The declined-key
    /// tag is not part of the comparison.
    pub fn matches(&self, dest: &DestinationEvent) -> bool {
        self.title == dest.title
            && blank_eq(&self.description, &dest.description)
            && blank_eq(&self.location, &dest.location)
            && self.start == dest.start
            && self.end == dest.end
            && self.effective_timezone() == effective_timezone(&dest.start, dest.timezone.as_deref())
            && trimmed(&self.recurrence) == trimmed(&dest.recurrence)
    }
}

fn effective_timezone<'a>(start: &EventTime, timezone: Option<&'a str>) -> Option<&'a str> {
    match start {
        EventTime::Date(_) => None,
        EventTime::DateTime(_) => Some(timezone.unwrap_or("UTC")),
    }
}

fn blank_eq(a: &Option<String>, b: &Option<String>) -> bool {
    a.as_deref().unwrap_or("").trim() == b.as_deref().unwrap_or("").trim()
}

fn trimmed(lines: &[String]) -> Vec<&str> {
    lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()).collect()
}

/// New content for one occurrence of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancePatch {
    pub title: String,
    pub start: EventTime,
    pub end: EventTime,
    pub timezone: Option<String>,
}

impl InstancePatch {
    pub fn from_override(o: &InstanceOverride, timezone: Option<String>) -> Self {
        InstancePatch {
            title: o.title.clone(),
            start: o.start,
            end: o.end,
            timezone,
        }
    }

    /// Whether the destination instance already shows this content.
    pub fn matches(&self, instance: &DestinationInstance) -> bool {
        instance.title.as_deref() == Some(self.title.as_str())
            && instance.start == Some(self.start)
            && instance.end == Some(self.end)
    }
}

/// A remote calendar service holding mirrored events.
///
/// Implementations only ever list and modify events tagged with
/// `destination.source_url`. Instance operations address an occurrence by the
/// series id and the occurrence's `InstanceKey`.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    /// Id of the calendar with this display name, if one exists.
    async fn find_calendar(&self, name: &str) -> SyncResult<Option<String>>;

    async fn create_calendar(&self, name: &str) -> SyncResult<String>;

    /// Get-or-create a calendar by display name.
    async fn ensure_calendar(&self, name: &str) -> SyncResult<String> {
        match self.find_calendar(name).await? {
            Some(id) => Ok(id),
            None => self.create_calendar(name).await,
        }
    }

    /// Sync-managed events overlapping the window, with their exceptions.
    async fn list_events(
        &self,
        destination: &Destination,
        window: &SyncWindow,
    ) -> SyncResult<Vec<DestinationEvent>>;

    /// Create a series or single event, returning its remote id.
    async fn create_event(
        &self,
        destination: &Destination,
        payload: &EventPayload,
    ) -> SyncResult<String>;

    /// Replace the content of an existing series in place.
    async fn update_event(
        &self,
        destination: &Destination,
        event_id: &str,
        payload: &EventPayload,
    ) -> SyncResult<()>;

    /// Rewrite only the sync-managed extended properties.
    async fn tag_event(
        &self,
        destination: &Destination,
        event_id: &str,
        uid: &str,
        source_declined: &BTreeSet<InstanceKey>,
    ) -> SyncResult<()>;

    /// Cancel a whole series or single event. Already gone counts as success.
    async fn cancel_event(&self, destination: &Destination, event_id: &str) -> SyncResult<()>;

    async fn cancel_instance(
        &self,
        destination: &Destination,
        series_id: &str,
        key: &InstanceKey,
    ) -> SyncResult<()>;

    async fn restore_instance(
        &self,
        destination: &Destination,
        series_id: &str,
        key: &InstanceKey,
    ) -> SyncResult<()>;

    async fn override_instance(
        &self,
        destination: &Destination,
        series_id: &str,
        key: &InstanceKey,
        patch: &InstancePatch,
    ) -> SyncResult<()>;
}
