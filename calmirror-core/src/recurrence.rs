//! RRULE handling for recurring source events.

use chrono::{Duration, Utc};
use rrule::RRuleSet;
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::event::{EventTime, NormalizedEvent};
use crate::window::SyncWindow;

/// Build an iCalendar-format rule set string for the rrule crate parser.
fn build_rrule_string(event: &NormalizedEvent) -> String {
    let mut lines = Vec::with_capacity(event.recurrence.len() + 1);

    // The rrule crate needs a datetime, so all-day dates become midnight UTC
    let dtstart = match (&event.start, event.timezone.as_deref()) {
        (EventTime::Date(d), _) => format!("DTSTART:{}T000000Z", d.format("%Y%m%d")),
        (EventTime::DateTime(dt), Some(tzid)) if tzid != "UTC" => {
            match tzid.parse::<chrono_tz::Tz>() {
                Ok(tz) => format!(
                    "DTSTART;TZID={}:{}",
                    tzid,
                    dt.with_timezone(&tz).format("%Y%m%dT%H%M%S")
                ),
                Err(_) => format!("DTSTART:{}", dt.format("%Y%m%dT%H%M%SZ")),
            }
        }
        (EventTime::DateTime(dt), _) => format!("DTSTART:{}", dt.format("%Y%m%dT%H%M%SZ")),
    };
    lines.push(dtstart);

    for line in &event.recurrence {
        let line = line.trim();
        if let Some(rule) = line.strip_prefix("RRULE:") {
            lines.push(format!("RRULE:{}", normalize_until(rule)));
        } else if let Some((head, values)) = line.split_once(':') {
            // Date-valued EXDATE/RDATE become midnight UTC to match DTSTART
            if head.contains("VALUE=DATE") && !head.contains("VALUE=DATE-TIME") {
                let name = head.split(';').next().unwrap_or(head);
                let values: Vec<String> = values
                    .split(',')
                    .map(|v| format!("{}T000000Z", v.trim()))
                    .collect();
                lines.push(format!("{}:{}", name, values.join(",")));
            } else {
                lines.push(line.to_string());
            }
        }
    }

    lines.join("\n")
}

/// Date-only UNTIL values are widened to the end of that day in UTC.
fn normalize_until(rule: &str) -> String {
    rule.split(';')
        .map(|part| match part.split_once('=') {
            Some(("UNTIL", value)) if !value.contains('T') => format!("UNTIL={}T235959Z", value),
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn rule_set(event: &NormalizedEvent) -> SyncResult<RRuleSet> {
    build_rrule_string(event).parse().map_err(|e| {
        SyncError::Parse(format!(
            "Failed to parse recurrence for event '{}': {}",
            event.uid, e
        ))
    })
}

/// Whether the span of a recurring series overlaps the window: it starts
/// before the window ends and has an occurrence that has not finished by the
/// time the window starts.
///
/// A rule the rrule crate rejects keeps the series, so the destination is
/// never cancelled on the strength of an expansion failure.
pub fn series_overlaps(event: &NormalizedEvent, window: &SyncWindow) -> bool {
    if event.start.to_utc() >= window.end {
        return false;
    }

    let rule_set = match rule_set(event) {
        Ok(set) => set,
        Err(e) => {
            warn!("{}; keeping the series", e);
            return true;
        }
    };

    let duration = event.duration().max(Duration::zero());
    let tz: rrule::Tz = Utc.into();
    let after = (window.start - duration).with_timezone(&tz);

    !rule_set.after(after).all(1).dates.is_empty()
}

/// Whether `start` is an occurrence of the series. Used to decide if a
/// RECURRENCE-ID points at a real instance.
pub fn is_occurrence(event: &NormalizedEvent, start: &EventTime) -> bool {
    let Ok(rule_set) = rule_set(event) else {
        return true;
    };

    let tz: rrule::Tz = Utc.into();
    let target = start.to_utc();
    let after = (target - Duration::seconds(1)).with_timezone(&tz);
    let before = (target + Duration::seconds(1)).with_timezone(&tz);

    rule_set
        .after(after)
        .before(before)
        .all(1)
        .dates
        .iter()
        .any(|dt| dt.with_timezone(&Utc) == target)
}
