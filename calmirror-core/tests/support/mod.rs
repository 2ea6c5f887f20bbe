//! In-memory stand-ins for the remote calendar and the feed server.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calmirror_core::backend::{CalendarBackend, Destination, EventPayload, InstancePatch};
use calmirror_core::destination::{DestinationEvent, DestinationInstance};
use calmirror_core::event::InstanceKey;
use calmirror_core::sync::FeedSource;
use calmirror_core::window::SyncWindow;
use calmirror_core::{SyncError, SyncResult};

#[derive(Debug, Clone)]
pub struct FakeInstance {
    pub cancelled: bool,
    pub patch: Option<InstancePatch>,
}

#[derive(Debug, Clone)]
pub struct FakeEvent {
    pub id: String,
    pub calendar_id: String,
    pub source_url: String,
    pub payload: EventPayload,
    pub instances: BTreeMap<InstanceKey, FakeInstance>,
    pub cancelled: bool,
}

#[derive(Default)]
struct State {
    calendars: Vec<(String, String)>,
    events: Vec<FakeEvent>,
    next_id: usize,
    writes: usize,
    fail_create: HashSet<String>,
    deleted_calendars: HashSet<String>,
    auth_broken: bool,
}

/// A remote calendar service held in memory.
///
/// Like a real service, updating a series in place drops the cancellations
/// of its instances. Clones share the same state.
#[derive(Clone, Default)]
pub struct FakeCalendar {
    state: Arc<Mutex<State>>,
}

impl FakeCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Make every create for this UID fail.
    pub fn fail_create_for(&self, uid: &str) {
        self.state().fail_create.insert(uid.to_string());
    }

    pub fn break_auth(&self) {
        self.state().auth_broken = true;
    }

    pub fn writes(&self) -> usize {
        self.state().writes
    }

    pub fn calendar_count(&self) -> usize {
        self.state().calendars.len()
    }

    /// A user deleting the destination calendar and everything in it.
    pub fn delete_calendar(&self, name: &str) {
        let mut state = self.state();
        let Some(pos) = state.calendars.iter().position(|(_, n)| n == name) else {
            return;
        };
        let (id, _) = state.calendars.remove(pos);
        state.events.retain(|e| e.calendar_id != id);
        state.deleted_calendars.insert(id);
    }

    /// Events that are not cancelled.
    pub fn live_events(&self) -> Vec<FakeEvent> {
        self.state()
            .events
            .iter()
            .filter(|e| !e.cancelled)
            .cloned()
            .collect()
    }

    pub fn event(&self, uid: &str) -> Option<FakeEvent> {
        self.live_events().into_iter().find(|e| e.payload.uid == uid)
    }

    pub fn is_instance_cancelled(&self, uid: &str, key: &InstanceKey) -> bool {
        self.event(uid)
            .and_then(|e| e.instances.get(key).map(|i| i.cancelled))
            .unwrap_or(false)
    }

    /// A user cancelling one occurrence directly in the remote calendar.
    pub fn decline_on_destination(&self, uid: &str, key: &InstanceKey) {
        let mut state = self.state();
        let event = state
            .events
            .iter_mut()
            .find(|e| !e.cancelled && e.payload.uid == uid)
            .unwrap();
        event
            .instances
            .entry(key.clone())
            .or_insert(FakeInstance {
                cancelled: false,
                patch: None,
            })
            .cancelled = true;
    }

    fn check_auth(&self) -> SyncResult<()> {
        if self.state().auth_broken {
            return Err(SyncError::Auth("token revoked".into()));
        }
        Ok(())
    }

    fn with_event<T>(
        &self,
        event_id: &str,
        f: impl FnOnce(&mut FakeEvent) -> T,
    ) -> SyncResult<T> {
        self.check_auth()?;
        let mut state = self.state();
        state.writes += 1;
        let event = state
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| SyncError::Remote(format!("404 event {}", event_id)))?;
        Ok(f(event))
    }
}

#[async_trait]
impl CalendarBackend for FakeCalendar {
    async fn find_calendar(&self, name: &str) -> SyncResult<Option<String>> {
        self.check_auth()?;
        Ok(self
            .state()
            .calendars
            .iter()
            .find(|(_, n)| n == name)
            .map(|(id, _)| id.clone()))
    }

    async fn create_calendar(&self, name: &str) -> SyncResult<String> {
        self.check_auth()?;
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("cal{}", state.next_id);
        state.calendars.push((id.clone(), name.to_string()));
        Ok(id)
    }

    async fn list_events(
        &self,
        destination: &Destination,
        window: &SyncWindow,
    ) -> SyncResult<Vec<DestinationEvent>> {
        self.check_auth()?;
        let state = self.state();
        if state.deleted_calendars.contains(&destination.calendar_id) {
            return Err(SyncError::NotFound(format!(
                "calendar {}",
                destination.calendar_id
            )));
        }
        Ok(state
            .events
            .iter()
            .filter(|e| {
                !e.cancelled
                    && e.calendar_id == destination.calendar_id
                    && e.source_url == destination.source_url
                    && (!e.payload.recurrence.is_empty()
                        || window.overlaps(&e.payload.start, &e.payload.end))
            })
            .map(|e| DestinationEvent {
                id: e.id.clone(),
                uid: e.payload.uid.clone(),
                title: e.payload.title.clone(),
                description: e.payload.description.clone(),
                location: e.payload.location.clone(),
                start: e.payload.start,
                end: e.payload.end,
                timezone: e.payload.timezone.clone(),
                recurrence: e.payload.recurrence.clone(),
                source_declined: e.payload.source_declined.clone(),
                instances: e
                    .instances
                    .iter()
                    .map(|(key, i)| DestinationInstance {
                        id: format!("{}_{}", e.id, key),
                        original_start: key.to_event_time(),
                        start: i.patch.as_ref().map(|p| p.start),
                        end: i.patch.as_ref().map(|p| p.end),
                        title: i.patch.as_ref().map(|p| p.title.clone()),
                        cancelled: i.cancelled,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn create_event(
        &self,
        destination: &Destination,
        payload: &EventPayload,
    ) -> SyncResult<String> {
        self.check_auth()?;
        let mut state = self.state();
        if state.fail_create.contains(&payload.uid) {
            return Err(SyncError::Remote("500 backend error".into()));
        }
        state.next_id += 1;
        state.writes += 1;
        let id = format!("ev{}", state.next_id);
        state.events.push(FakeEvent {
            id: id.clone(),
            calendar_id: destination.calendar_id.clone(),
            source_url: destination.source_url.clone(),
            payload: payload.clone(),
            instances: BTreeMap::new(),
            cancelled: false,
        });
        Ok(id)
    }

    async fn update_event(
        &self,
        _destination: &Destination,
        event_id: &str,
        payload: &EventPayload,
    ) -> SyncResult<()> {
        self.with_event(event_id, |e| {
            e.payload = payload.clone();
            for instance in e.instances.values_mut() {
                instance.cancelled = false;
            }
        })
    }

    async fn tag_event(
        &self,
        _destination: &Destination,
        event_id: &str,
        _uid: &str,
        source_declined: &BTreeSet<InstanceKey>,
    ) -> SyncResult<()> {
        self.with_event(event_id, |e| e.payload.source_declined = source_declined.clone())
    }

    async fn cancel_event(&self, _destination: &Destination, event_id: &str) -> SyncResult<()> {
        self.with_event(event_id, |e| e.cancelled = true)
    }

    async fn cancel_instance(
        &self,
        _destination: &Destination,
        series_id: &str,
        key: &InstanceKey,
    ) -> SyncResult<()> {
        self.with_event(series_id, |e| {
            e.instances
                .entry(key.clone())
                .or_insert(FakeInstance {
                    cancelled: false,
                    patch: None,
                })
                .cancelled = true;
        })
    }

    async fn restore_instance(
        &self,
        _destination: &Destination,
        series_id: &str,
        key: &InstanceKey,
    ) -> SyncResult<()> {
        self.with_event(series_id, |e| {
            if let Some(instance) = e.instances.get_mut(key) {
                instance.cancelled = false;
            }
        })
    }

    async fn override_instance(
        &self,
        _destination: &Destination,
        series_id: &str,
        key: &InstanceKey,
        patch: &InstancePatch,
    ) -> SyncResult<()> {
        self.with_event(series_id, |e| {
            let instance = e.instances.entry(key.clone()).or_insert(FakeInstance {
                cancelled: false,
                patch: None,
            });
            instance.patch = Some(patch.clone());
        })
    }
}

/// Serves fixed feed bodies by url. Clones share the same bodies.
#[derive(Clone, Default)]
pub struct StaticFeed {
    bodies: Arc<Mutex<HashMap<String, Result<String, String>>>>,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, body: impl Into<String>) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.into()));
    }

    pub fn fail(&self, url: &str, reason: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(reason.to_string()));
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch(&self, url: &str) -> SyncResult<String> {
        match self.bodies.lock().unwrap().get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(reason)) => Err(SyncError::Fetch(format!("{}: {}", url, reason))),
            None => Err(SyncError::Fetch(format!("{} returned 404 Not Found", url))),
        }
    }
}

/// Wrap VEVENT blocks in a calendar.
pub fn ics(events: &[&str]) -> String {
    let mut out = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//calmirror//test//EN\r\n");
    for event in events {
        out.push_str(event);
    }
    out.push_str("END:VCALENDAR\r\n");
    out
}

/// A single timed VEVENT in UTC.
pub fn vevent(uid: &str, summary: &str, start: &str, end: &str) -> String {
    format!(
        "BEGIN:VEVENT\r\nUID:{}\r\nSUMMARY:{}\r\nDTSTART:{}\r\nDTEND:{}\r\nEND:VEVENT\r\n",
        uid, summary, start, end
    )
}
