//! Conversion between calmirror's event model and Calendar v3 resources.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use calmirror_core::SyncResult;
use calmirror_core::backend::{
    Destination, EventPayload, InstancePatch, SOURCE_DECLINED_PROPERTY, SOURCE_PROPERTY,
    UID_PROPERTY,
};
use calmirror_core::destination::{DestinationEvent, DestinationInstance};
use calmirror_core::event::{EventTime, InstanceKey, decode_keys, encode_keys};
use google_calendar::types::{Event, EventDateTime};
use tracing::warn;

use crate::wire::{self, CONFIRMED};

pub fn to_google_time(time: &EventTime, timezone: Option<&str>) -> EventDateTime {
    match time {
        EventTime::Date(d) => EventDateTime {
            date: Some(*d),
            date_time: None,
            time_zone: String::new(),
        },
        EventTime::DateTime(dt) => EventDateTime {
            date: None,
            date_time: Some(*dt),
            time_zone: timezone.unwrap_or_default().to_string(),
        },
    }
}

pub fn from_google_time(time: &EventDateTime) -> Option<EventTime> {
    if let Some(dt) = time.date_time {
        Some(EventTime::DateTime(dt))
    } else {
        time.date.map(EventTime::Date)
    }
}

fn private_properties(
    destination: &Destination,
    uid: &str,
    source_declined: &BTreeSet<InstanceKey>,
) -> BTreeMap<String, String> {
    let mut private = BTreeMap::new();
    private.insert(SOURCE_PROPERTY.to_string(), destination.source_url.clone());
    private.insert(UID_PROPERTY.to_string(), uid.to_string());
    private.insert(
        SOURCE_DECLINED_PROPERTY.to_string(),
        encode_keys(source_declined),
    );
    private
}

/// Full resource for inserting or replacing a series.
pub fn event_body(destination: &Destination, payload: &EventPayload) -> SyncResult<Event> {
    let timezone = payload.effective_timezone();

    let mut event = Event {
        status: CONFIRMED.to_string(),
        summary: payload.title.clone(),
        description: payload.description.clone().unwrap_or_default(),
        location: payload.location.clone().unwrap_or_default(),
        start: Some(to_google_time(&payload.start, timezone)),
        end: Some(to_google_time(&payload.end, timezone)),
        recurrence: payload.recurrence.clone(),
        ..Default::default()
    };
    wire::set_private_properties(
        &mut event,
        &private_properties(destination, &payload.uid, &payload.source_declined),
    )?;

    Ok(event)
}

/// Patch body touching only the sync-managed properties.
pub fn tag_body(
    destination: &Destination,
    uid: &str,
    source_declined: &BTreeSet<InstanceKey>,
) -> SyncResult<Event> {
    let mut event = Event::default();
    wire::set_private_properties(
        &mut event,
        &private_properties(destination, uid, source_declined),
    )?;
    Ok(event)
}

pub fn status_body(status: &str) -> Event {
    Event {
        status: status.to_string(),
        ..Default::default()
    }
}

pub fn instance_body(patch: &InstancePatch) -> Event {
    let timezone = match patch.start {
        EventTime::Date(_) => None,
        EventTime::DateTime(_) => Some(patch.timezone.as_deref().unwrap_or("UTC")),
    };

    Event {
        status: CONFIRMED.to_string(),
        summary: patch.title.clone(),
        start: Some(to_google_time(&patch.start, timezone)),
        end: Some(to_google_time(&patch.end, timezone)),
        ..Default::default()
    }
}

/// Remote id of one occurrence of a series.
pub fn instance_id(series_id: &str, key: &InstanceKey) -> String {
    format!("{}_{}", series_id, key)
}

fn non_empty(value: String) -> Option<String> {
    Some(value).filter(|s| !s.trim().is_empty())
}

fn to_instance(event: Event) -> Option<DestinationInstance> {
    let original_start = event.original_start_time.as_ref().and_then(from_google_time)?;

    Some(DestinationInstance {
        cancelled: wire::is_cancelled(&event),
        start: event.start.as_ref().and_then(from_google_time),
        end: event.end.as_ref().and_then(from_google_time),
        title: non_empty(event.summary),
        id: event.id,
        original_start,
    })
}

fn to_destination(event: Event) -> Option<DestinationEvent> {
    let mut private = wire::private_properties(&event);
    let uid = private.remove(UID_PROPERTY)?;
    let source_declined = private
        .get(SOURCE_DECLINED_PROPERTY)
        .map(|keys| decode_keys(keys))
        .unwrap_or_default();

    let (Some(start), Some(end)) = (
        event.start.as_ref().and_then(from_google_time),
        event.end.as_ref().and_then(from_google_time),
    ) else {
        warn!("Ignoring remote event {} ({}): no usable start/end", event.id, uid);
        return None;
    };

    Some(DestinationEvent {
        timezone: event
            .start
            .as_ref()
            .and_then(|s| non_empty(s.time_zone.clone())),
        title: event.summary,
        description: non_empty(event.description),
        location: non_empty(event.location),
        recurrence: event.recurrence,
        instances: Vec::new(),
        id: event.id,
        uid,
        start,
        end,
        source_declined,
    })
}

/// Turn a raw `singleEvents=false` listing of the whole calendar into the
/// series mirrored from `source_url`.
///
/// Masters are matched on their source tag. Exceptions carry no tags of
/// their own (cancelled ones only guarantee `id`, `recurringEventId` and
/// `originalStartTime`) and are attached to their series by
/// `recurringEventId`. Cancelled masters and events from other sources are
/// dropped.
pub fn destination_events(items: Vec<Event>, source_url: &str) -> Vec<DestinationEvent> {
    let (exceptions, masters): (Vec<_>, Vec<_>) = items
        .into_iter()
        .partition(|e| !e.recurring_event_id.is_empty());

    let mut events: Vec<DestinationEvent> = masters
        .into_iter()
        .filter(|e| !e.id.is_empty() && !wire::is_cancelled(e))
        .filter(|e| wire::private_property(e, SOURCE_PROPERTY).as_deref() == Some(source_url))
        .filter_map(to_destination)
        .collect();

    let index: HashMap<String, usize> = events
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id.clone(), i))
        .collect();

    for exception in exceptions {
        let Some(&i) = index.get(&exception.recurring_event_id) else {
            continue;
        };
        if let Some(instance) = to_instance(exception) {
            events[i].instances.push(instance);
        }
    }

    events
}
