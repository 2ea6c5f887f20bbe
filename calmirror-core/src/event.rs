//! Source-side event types.
//!
//! A feed is parsed into `NormalizedEvent`s at the boundary and nothing
//! downstream ever looks at raw iCal properties again. These values are
//! rebuilt on every cycle and never persisted.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Start or end of an event: a whole day, or an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventTime {
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl EventTime {
    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// The instant this time starts at. All-day values map to midnight UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            EventTime::Date(d) => d.and_time(chrono::NaiveTime::MIN).and_utc(),
            EventTime::DateTime(dt) => *dt,
        }
    }

    pub fn instance_key(&self) -> InstanceKey {
        InstanceKey::from(self)
    }

    pub fn plus(&self, duration: Duration) -> EventTime {
        match self {
            EventTime::Date(d) => EventTime::Date(*d + Duration::days(duration.num_days())),
            EventTime::DateTime(dt) => EventTime::DateTime(*dt + duration),
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventTime::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M UTC")),
        }
    }
}

/// Canonical string form of an instance's original start: `YYYYMMDD` for
/// all-day series and `YYYYMMDDTHHMMSSZ` for timed ones.
///
/// This is the join key between source overrides and destination instances.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceKey(String);

impl InstanceKey {
    pub fn parse(s: &str) -> SyncResult<Self> {
        let s = s.trim();
        let valid = match s.len() {
            8 => NaiveDate::parse_from_str(s, "%Y%m%d").is_ok(),
            16 => NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%SZ").is_ok(),
            _ => false,
        };

        if valid {
            Ok(InstanceKey(s.to_string()))
        } else {
            Err(SyncError::Parse(format!("Invalid instance key '{}'", s)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The original start this key encodes.
    pub fn to_event_time(&self) -> EventTime {
        match NaiveDateTime::parse_from_str(&self.0, "%Y%m%dT%H%M%SZ") {
            Ok(dt) => EventTime::DateTime(dt.and_utc()),
            // Keys are validated on construction, so the only other shape is a date
            Err(_) => EventTime::Date(
                NaiveDate::parse_from_str(&self.0, "%Y%m%d").unwrap_or_default(),
            ),
        }
    }
}

impl From<&EventTime> for InstanceKey {
    fn from(time: &EventTime) -> Self {
        match time {
            EventTime::Date(d) => InstanceKey(d.format("%Y%m%d").to_string()),
            EventTime::DateTime(dt) => InstanceKey(dt.format("%Y%m%dT%H%M%SZ").to_string()),
        }
    }
}

impl TryFrom<String> for InstanceKey {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        InstanceKey::parse(&value)
    }
}

impl From<InstanceKey> for String {
    fn from(key: InstanceKey) -> Self {
        key.0
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode a set of keys for storage in a single string property.
pub fn encode_keys(keys: &BTreeSet<InstanceKey>) -> String {
    keys.iter().map(InstanceKey::as_str).collect::<Vec<_>>().join(",")
}

/// Decode a comma separated key list. Malformed entries are dropped.
pub fn decode_keys(raw: &str) -> BTreeSet<InstanceKey> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| InstanceKey::parse(s).ok())
        .collect()
}

/// One RECURRENCE-ID component, folded into its series.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceOverride {
    pub original_start: EventTime,
    pub title: String,
    pub start: EventTime,
    pub end: EventTime,
    pub declined: bool,
}

impl InstanceOverride {
    pub fn key(&self) -> InstanceKey {
        self.original_start.instance_key()
    }
}

/// A feed event after parsing, validation and override folding.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub uid: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    /// IANA zone name the event was authored in, when it had one
    pub timezone: Option<String>,
    /// RRULE, EXDATE and RDATE lines; empty for single events
    pub recurrence: Vec<String>,
    pub overrides: Vec<InstanceOverride>,
    pub declined: bool,
}

impl NormalizedEvent {
    pub fn is_recurring(&self) -> bool {
        !self.recurrence.is_empty()
    }

    /// Keys of the instances the feed marks as declined.
    pub fn declined_keys(&self) -> BTreeSet<InstanceKey> {
        self.overrides
            .iter()
            .filter(|o| o.declined)
            .map(InstanceOverride::key)
            .collect()
    }

    pub fn duration(&self) -> Duration {
        self.end.to_utc() - self.start.to_utc()
    }
}
