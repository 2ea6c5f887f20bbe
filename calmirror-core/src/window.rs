//! The time window a calendar is mirrored within.

use chrono::{DateTime, Duration, Utc};

use crate::config::CalendarSourceConfig;
use crate::event::{EventTime, NormalizedEvent};
use crate::recurrence;

/// `[start, end)` around the current time. Only events overlapping it take
/// part in reconciliation, on both the source and the destination side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        SyncWindow { start, end }
    }

    /// Window for a calendar: `days_back` before `now` to `days_forward` after.
    pub fn around(now: DateTime<Utc>, days_back: i64, days_forward: i64) -> Self {
        SyncWindow {
            start: now - Duration::days(days_back),
            end: now + Duration::days(days_forward),
        }
    }

    pub fn for_calendar(config: &CalendarSourceConfig, now: DateTime<Utc>) -> Self {
        Self::around(now, config.days_back, config.days_forward)
    }

    /// Whether `[start, end)` overlaps the window. Zero-length events count
    /// when their start lies inside it.
    pub fn overlaps(&self, start: &EventTime, end: &EventTime) -> bool {
        let start = start.to_utc();
        let end = end.to_utc().max(start);

        if start == end {
            return start >= self.start && start < self.end;
        }

        start < self.end && end > self.start
    }

    /// Whether a source event belongs to this window.
    ///
    /// Recurring series are kept when their span (first occurrence through
    /// the last one) overlaps the window, which matches what the destination
    /// listing returns for series masters. A moved override that lands in the
    /// window also keeps its series.
    pub fn contains(&self, event: &NormalizedEvent) -> bool {
        if !event.is_recurring() {
            return self.overlaps(&event.start, &event.end);
        }

        if event
            .overrides
            .iter()
            .any(|o| !o.declined && self.overlaps(&o.start, &o.end))
        {
            return true;
        }

        recurrence::series_overlaps(event, self)
    }

    pub fn rfc3339_start(&self) -> String {
        self.start.to_rfc3339()
    }

    pub fn rfc3339_end(&self) -> String {
        self.end.to_rfc3339()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn window() -> SyncWindow {
        SyncWindow::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
        )
    }

    fn at(d: u32, h: u32) -> EventTime {
        EventTime::DateTime(Utc.with_ymd_and_hms(2025, 1, d, h, 0, 0).unwrap())
    }

    #[test]
    fn around_uses_day_offsets() {
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
        let w = SyncWindow::around(now, 30, 60);
        assert_eq!(w.start, Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap());
        assert_eq!(w.end, Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn overlap_is_half_open() {
        let w = window();
        assert!(w.overlaps(&at(10, 10), &at(10, 11)));

        let before_start = EventTime::DateTime(Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap());
        let at_start = EventTime::DateTime(w.start);
        assert!(!w.overlaps(&before_start, &at_start));
        assert!(w.overlaps(&before_start, &at(1, 1)));
    }

    #[test]
    fn all_day_event_on_last_day_counts() {
        let w = window();
        let start = EventTime::Date(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
        let end = EventTime::Date(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert!(w.overlaps(&start, &end));
    }

    #[test]
    fn zero_length_event_inside_counts() {
        let w = window();
        assert!(w.overlaps(&at(5, 9), &at(5, 9)));
    }
}
