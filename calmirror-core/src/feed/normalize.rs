//! iCal feed parsing using the icalendar crate's parser.
//!
//! Every VEVENT becomes either a `NormalizedEvent` or, when it carries a
//! RECURRENCE-ID, an `InstanceOverride` folded into its series. All times are
//! resolved to UTC here; the authoring zone survives only as an IANA name on
//! the event.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::event::{EventTime, InstanceOverride, NormalizedEvent};
use crate::recurrence;

const UNTITLED: &str = "(No title)";

/// Parse a feed into normalized events.
///
/// Only an unreadable calendar is an error. Individual VEVENTs that cannot be
/// used (no UID, no DTSTART) are skipped with a warning.
pub fn normalize(content: &str) -> SyncResult<Vec<NormalizedEvent>> {
    let unfolded = unfold(content);
    if !unfolded.to_ascii_uppercase().contains("BEGIN:VCALENDAR") {
        return Err(SyncError::Parse("Feed is not an iCalendar document".into()));
    }

    let calendar =
        read_calendar(&unfolded).map_err(|e| SyncError::Parse(format!("Invalid iCal data: {}", e)))?;

    let mut events: Vec<NormalizedEvent> = Vec::new();
    let mut index_by_uid: HashMap<String, usize> = HashMap::new();
    let mut overrides: Vec<ParsedOverride> = Vec::new();

    for vevent in calendar.components.iter().filter(|c| c.name == "VEVENT") {
        let parsed = match parse_vevent(vevent) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Skipping event: {}", e);
                continue;
            }
        };

        match parsed {
            Parsed::Master(event) => {
                if index_by_uid.contains_key(&event.uid) {
                    warn!("Duplicate event UID '{}', keeping the first", event.uid);
                    continue;
                }
                index_by_uid.insert(event.uid.clone(), events.len());
                events.push(event);
            }
            Parsed::Override(o) => overrides.push(o),
        }
    }

    let mut standalone = Vec::new();
    for parsed in overrides {
        let series = index_by_uid.get(&parsed.event.uid).copied().filter(|&i| {
            events[i].is_recurring()
                && recurrence::is_occurrence(&events[i], &parsed.instance.original_start)
        });

        match series {
            Some(i) => {
                let key = parsed.instance.key();
                events[i].overrides.retain(|o| o.key() != key);
                events[i].overrides.push(parsed.instance);
            }
            None => {
                debug!(
                    "Override {} of '{}' has no matching series, keeping it as a single event",
                    parsed.instance.key(),
                    parsed.event.uid
                );
                standalone.push(parsed.into_standalone());
            }
        }
    }

    for event in &mut events {
        event.overrides.sort_by(|a, b| a.original_start.cmp(&b.original_start));
    }

    events.extend(standalone);
    Ok(events)
}

enum Parsed {
    Master(NormalizedEvent),
    Override(ParsedOverride),
}

struct ParsedOverride {
    instance: InstanceOverride,
    /// The same component as a single event, used when no series claims it
    event: NormalizedEvent,
}

impl ParsedOverride {
    fn into_standalone(self) -> NormalizedEvent {
        NormalizedEvent {
            uid: format!("{}_{}", self.event.uid, self.instance.key()),
            ..self.event
        }
    }
}

fn parse_vevent(vevent: &Component) -> SyncResult<Parsed> {
    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| {
            let summary = vevent.find_prop("SUMMARY").map(|p| p.val.to_string());
            SyncError::Parse(format!(
                "event '{}' has no UID",
                summary.as_deref().unwrap_or(UNTITLED)
            ))
        })?;

    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| unescape_text(p.val.as_ref()))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let dtstart = vevent
        .find_prop("DTSTART")
        .ok_or_else(|| SyncError::Parse(format!("event '{}' has no DTSTART", uid)))?;
    let (start, timezone) = resolve_property_time(dtstart, &uid)?;
    let end = resolve_end(vevent, &start, &uid)?;

    let description = vevent
        .find_prop("DESCRIPTION")
        .map(|p| unescape_text(p.val.as_ref()))
        .filter(|s| !s.is_empty());
    let location = vevent
        .find_prop("LOCATION")
        .map(|p| unescape_text(p.val.as_ref()))
        .filter(|s| !s.is_empty());

    let declined = is_declined(vevent, &title);
    if declined {
        debug!("Event '{}' ({}) is declined in the feed", title, uid);
    }

    let recurrence = recurrence_lines(vevent, &uid);

    let event = NormalizedEvent {
        uid,
        title,
        description,
        location,
        start,
        end,
        timezone,
        recurrence,
        overrides: Vec::new(),
        declined,
    };

    match vevent.find_prop("RECURRENCE-ID") {
        Some(prop) => {
            let (original_start, _) = resolve_property_time(prop, &event.uid)?;
            let instance = InstanceOverride {
                original_start,
                title: event.title.clone(),
                start: event.start,
                end: event.end,
                declined: event.declined,
            };
            // An override never carries its own rule
            let event = NormalizedEvent {
                recurrence: Vec::new(),
                ..event
            };
            Ok(Parsed::Override(ParsedOverride { instance, event }))
        }
        None => Ok(Parsed::Master(event)),
    }
}

/// Declined in the feed: `STATUS:CANCELLED`, an Outlook style
/// `Canceled:`/`Cancelled:` summary prefix, or any attendee with
/// `PARTSTAT=DECLINED`.
fn is_declined(vevent: &Component, title: &str) -> bool {
    let cancelled_status = vevent
        .find_prop("STATUS")
        .is_some_and(|p| p.val.as_ref().trim().eq_ignore_ascii_case("CANCELLED"));

    let cancelled_prefix = title.starts_with("Canceled:") || title.starts_with("Cancelled:");

    let attendee_declined = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .any(|p| {
            p.params.iter().any(|param| {
                param.key == "PARTSTAT"
                    && param
                        .val
                        .as_ref()
                        .is_some_and(|v| v.as_ref().eq_ignore_ascii_case("DECLINED"))
            })
        });

    cancelled_status || cancelled_prefix || attendee_declined
}

fn resolve_end(vevent: &Component, start: &EventTime, uid: &str) -> SyncResult<EventTime> {
    let end = match vevent.find_prop("DTEND") {
        Some(prop) => resolve_property_time(prop, uid)?.0,
        None => match vevent.find_prop("DURATION").and_then(|p| parse_duration(p.val.as_ref())) {
            Some(duration) => start.plus(duration),
            None if start.is_all_day() => start.plus(Duration::days(1)),
            None => *start,
        },
    };

    let end = match (start, end) {
        (EventTime::Date(_), EventTime::DateTime(_)) | (EventTime::DateTime(_), EventTime::Date(_)) => {
            warn!("Event '{}' mixes date and date-time bounds, using default end", uid);
            if start.is_all_day() {
                start.plus(Duration::days(1))
            } else {
                *start
            }
        }
        _ => end,
    };

    if end < *start {
        warn!("Event '{}' ends before it starts, using start as end", uid);
        return Ok(*start);
    }

    Ok(end)
}

fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.starts_with('-') {
        return None;
    }
    let duration = iso8601::duration(value.trim_start_matches('+')).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

/// Resolve DTSTART/DTEND/RECURRENCE-ID to an `EventTime`, plus the IANA zone
/// it was written in when there was one.
fn resolve_property_time(prop: &Property, uid: &str) -> SyncResult<(EventTime, Option<String>)> {
    let dpt = DatePerhapsTime::try_from(prop).map_err(|_| {
        SyncError::Parse(format!(
            "event '{}' has an invalid {} value '{}'",
            uid,
            prop.name.as_ref(),
            prop.val.as_ref()
        ))
    })?;

    Ok(match dpt {
        DatePerhapsTime::Date(d) => (EventTime::Date(d), None),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => (EventTime::DateTime(dt), None),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            warn!("Event '{}' has a floating time, treating it as UTC", uid);
            (EventTime::DateTime(naive.and_utc()), None)
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            match resolve_tzid(&tzid) {
                Some(tz) => (
                    EventTime::DateTime(local_to_utc(&tz, date_time)),
                    Some(tz.name().to_string()),
                ),
                None => {
                    warn!("Event '{}' has unknown TZID '{}', treating it as UTC", uid, tzid);
                    (EventTime::DateTime(date_time.and_utc()), None)
                }
            }
        }
    })
}

/// Map a TZID to a chrono-tz zone. Accepts IANA names, quoted names,
/// vendor-prefixed paths like `/mozilla.org/20050126_1/Europe/Berlin` and
/// the common Windows zone names Outlook exports.
pub fn resolve_tzid(tzid: &str) -> Option<Tz> {
    let tzid = tzid.trim().trim_matches('"');

    if let Ok(tz) = tzid.parse::<Tz>() {
        return Some(tz);
    }

    if let Some(iana) = windows_zone(tzid) {
        return iana.parse().ok();
    }

    // Vendor prefixed: try the trailing Area/Location (or Area/Sub/Location)
    let parts: Vec<&str> = tzid.split('/').filter(|s| !s.is_empty()).collect();
    for n in [3, 2] {
        if parts.len() >= n {
            let candidate = parts[parts.len() - n..].join("/");
            if let Ok(tz) = candidate.parse::<Tz>() {
                return Some(tz);
            }
        }
    }

    None
}

fn windows_zone(name: &str) -> Option<&'static str> {
    let iana = match name {
        "UTC" | "Coordinated Universal Time" => "UTC",
        "GMT Standard Time" => "Europe/London",
        "Greenwich Standard Time" => "Atlantic/Reykjavik",
        "W. Europe Standard Time" => "Europe/Berlin",
        "Romance Standard Time" => "Europe/Paris",
        "Central Europe Standard Time" => "Europe/Budapest",
        "Central European Standard Time" => "Europe/Warsaw",
        "E. Europe Standard Time" => "Europe/Chisinau",
        "FLE Standard Time" => "Europe/Kiev",
        "GTB Standard Time" => "Europe/Bucharest",
        "Russian Standard Time" => "Europe/Moscow",
        "Eastern Standard Time" => "America/New_York",
        "Central Standard Time" => "America/Chicago",
        "Mountain Standard Time" => "America/Denver",
        "US Mountain Standard Time" => "America/Phoenix",
        "Pacific Standard Time" => "America/Los_Angeles",
        "Alaskan Standard Time" => "America/Anchorage",
        "Hawaiian Standard Time" => "Pacific/Honolulu",
        "Atlantic Standard Time" => "America/Halifax",
        "E. South America Standard Time" => "America/Sao_Paulo",
        "India Standard Time" => "Asia/Kolkata",
        "China Standard Time" => "Asia/Shanghai",
        "Singapore Standard Time" => "Asia/Singapore",
        "Tokyo Standard Time" => "Asia/Tokyo",
        "Korea Standard Time" => "Asia/Seoul",
        "AUS Eastern Standard Time" => "Australia/Sydney",
        "New Zealand Standard Time" => "Pacific/Auckland",
        _ => return None,
    };
    Some(iana)
}

/// Local wall time to UTC. Ambiguous times take the earlier instant;
/// times inside a DST gap are pushed forward by an hour.
fn local_to_utc(tz: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| local.and_utc())
}

/// RRULE, EXDATE and RDATE as Google-style recurrence lines. Date lists are
/// rewritten to UTC (`EXDATE:20250110T100000Z`) or kept as dates
/// (`EXDATE;VALUE=DATE:20250110`).
fn recurrence_lines(vevent: &Component, uid: &str) -> Vec<String> {
    let mut lines = Vec::new();

    for prop in &vevent.properties {
        if prop.name == "RRULE" {
            lines.push(format!("RRULE:{}", prop.val.as_ref().trim()));
        } else if prop.name == "EXDATE" || prop.name == "RDATE" {
            let name = prop.name.as_ref();
            let (dates, times): (Vec<EventTime>, Vec<EventTime>) = parse_date_list(prop, uid)
                .into_iter()
                .partition(EventTime::is_all_day);

            if !dates.is_empty() {
                lines.push(format!("{};VALUE=DATE:{}", name, join_keys(&dates)));
            }
            if !times.is_empty() {
                lines.push(format!("{}:{}", name, join_keys(&times)));
            }
        }
    }

    // Without an RRULE or RDATE there is nothing to recur
    if !lines
        .iter()
        .any(|l| l.starts_with("RRULE:") || l.starts_with("RDATE"))
    {
        lines.clear();
    }

    lines
}

fn join_keys(times: &[EventTime]) -> String {
    times
        .iter()
        .map(|t| t.instance_key().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse an EXDATE/RDATE property into a list of times.
///
/// Handles:
/// - TZID parameter: `EXDATE;TZID=America/New_York:20240108T100000`
/// - VALUE=DATE: `EXDATE;VALUE=DATE:20240108`
/// - UTC: `EXDATE:20240108T100000Z`
/// - Floating: `EXDATE:20240108T100000`
/// - Comma-separated values
fn parse_date_list(prop: &Property, uid: &str) -> Vec<EventTime> {
    let tz = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
        .and_then(|tzid| {
            let tz = resolve_tzid(&tzid);
            if tz.is_none() {
                warn!("Event '{}' has unknown TZID '{}' in {}, using UTC", uid, tzid, prop.name.as_ref());
            }
            tz
        });

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date || s.len() == 8 {
                return NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(EventTime::Date);
            }
            let (naive, utc) = match s.strip_suffix('Z') {
                Some(s) => (s, true),
                None => (s, false),
            };
            let naive = NaiveDateTime::parse_from_str(naive, "%Y%m%dT%H%M%S").ok()?;
            Some(EventTime::DateTime(match (&tz, utc) {
                (Some(tz), false) => local_to_utc(tz, naive),
                _ => naive.and_utc(),
            }))
        })
        .collect()
}

/// Undo RFC 5545 TEXT escaping.
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}
