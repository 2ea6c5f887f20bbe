//! The sync loop: fetch, normalize, reconcile, for each calendar in turn.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::backend::{CalendarBackend, Destination};
use crate::config::CalendarSourceConfig;
use crate::destination::DestinationEvent;
use crate::error::{SyncError, SyncResult};
use crate::feed;
use crate::reconcile::{self, ApplyReport, Plan};
use crate::window::SyncWindow;

/// Where feed documents come from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> SyncResult<String>;
}

/// Outcome of syncing one calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarReport {
    pub calendar_name: String,
    /// Source events inside the window
    pub source_events: usize,
    pub plan: Plan,
    /// `None` for dry runs
    pub applied: Option<ApplyReport>,
}

/// Outcome of one pass over all calendars.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub calendars: Vec<(String, SyncResult<CalendarReport>)>,
}

impl CycleReport {
    pub fn totals(&self) -> ApplyReport {
        let mut total = ApplyReport::default();
        for report in self.calendars.iter().filter_map(|(_, r)| r.as_ref().ok()) {
            if let Some(applied) = &report.applied {
                total.merge(applied);
            }
        }
        total
    }

    pub fn failed_calendars(&self) -> usize {
        self.calendars.iter().filter(|(_, r)| r.is_err()).count()
    }
}

/// Mirrors a set of feeds into a calendar backend.
///
/// Holds everything a cycle needs, so nothing lives in globals. Calendars are
/// processed strictly one after the other.
pub struct Mirror<B, F> {
    backend: B,
    feed: F,
    calendars: Vec<CalendarSourceConfig>,
    /// Destination calendar ids by calendar name, resolved once and kept
    /// until the remote reports the calendar missing
    calendar_ids: HashMap<String, String>,
}

impl<B, F> Mirror<B, F>
where
    B: CalendarBackend,
    F: FeedSource,
{
    pub fn new(backend: B, feed: F, calendars: Vec<CalendarSourceConfig>) -> Self {
        Mirror {
            backend,
            feed,
            calendars,
            calendar_ids: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn calendars(&self) -> &[CalendarSourceConfig] {
        &self.calendars
    }

    async fn destination(
        &mut self,
        config: &CalendarSourceConfig,
        create: bool,
    ) -> SyncResult<Option<Destination>> {
        let id = match self.calendar_ids.get(&config.calendar_name) {
            Some(id) => Some(id.clone()),
            None if create => Some(self.backend.ensure_calendar(&config.calendar_name).await?),
            None => self.backend.find_calendar(&config.calendar_name).await?,
        };

        if let Some(id) = &id {
            self.calendar_ids
                .insert(config.calendar_name.clone(), id.clone());
        }

        Ok(id.map(|calendar_id| Destination {
            calendar_id,
            source_url: config.url.clone(),
        }))
    }

    /// A destination calendar deleted while running is looked up (or created)
    /// again on the next cycle.
    fn forget_if_gone(&mut self, config: &CalendarSourceConfig, error: &SyncError) {
        if error.is_not_found() && self.calendar_ids.remove(&config.calendar_name).is_some() {
            warn!(
                "{}: destination calendar is gone, resolving it again next cycle",
                config.calendar_name
            );
        }
    }

    /// Fetch and plan one calendar without writing anything. A destination
    /// calendar that does not exist yet is treated as empty.
    pub async fn plan_calendar(
        &mut self,
        config: &CalendarSourceConfig,
        now: DateTime<Utc>,
    ) -> SyncResult<CalendarReport> {
        let window = SyncWindow::for_calendar(config, now);
        let destination = self.destination(config, false).await?;

        let (source_events, plan) = self
            .build_plan(config, destination.as_ref(), &window)
            .await
            .inspect_err(|e| self.forget_if_gone(config, e))?;

        Ok(CalendarReport {
            calendar_name: config.calendar_name.clone(),
            source_events,
            plan,
            applied: None,
        })
    }

    /// Fetch, plan and apply one calendar.
    pub async fn sync_calendar(
        &mut self,
        config: &CalendarSourceConfig,
        now: DateTime<Utc>,
    ) -> SyncResult<CalendarReport> {
        let window = SyncWindow::for_calendar(config, now);
        let destination = self
            .destination(config, true)
            .await?
            .ok_or_else(|| SyncError::Remote("calendar could not be created".into()))?;

        let (source_events, plan) = self
            .build_plan(config, Some(&destination), &window)
            .await
            .inspect_err(|e| self.forget_if_gone(config, e))?;
        let applied = reconcile::apply(&self.backend, &destination, &plan).await?;

        info!(
            "{}: {} events in window, {}",
            config.calendar_name, source_events, applied
        );

        Ok(CalendarReport {
            calendar_name: config.calendar_name.clone(),
            source_events,
            plan,
            applied: Some(applied),
        })
    }

    async fn build_plan(
        &self,
        config: &CalendarSourceConfig,
        destination: Option<&Destination>,
        window: &SyncWindow,
    ) -> SyncResult<(usize, Plan)> {
        let content = self.feed.fetch(&config.url).await?;
        let source: Vec<_> = feed::normalize(&content)?
            .into_iter()
            .filter(|e| window.contains(e))
            .collect();

        let existing: Vec<DestinationEvent> = match destination {
            Some(destination) => self.backend.list_events(destination, window).await?,
            None => Vec::new(),
        };

        let plan = reconcile::plan(&source, &existing);
        Ok((source.len(), plan))
    }

    /// One pass over every calendar. A calendar that fails is logged and
    /// skipped; the others still run.
    pub async fn run_once(&mut self, dry_run: bool) -> CycleReport {
        let mut report = CycleReport::default();
        let calendars = self.calendars.clone();

        for config in &calendars {
            let result = self.run_calendar(config, dry_run).await;
            report
                .calendars
                .push((config.calendar_name.clone(), result));
        }

        report
    }

    async fn run_calendar(
        &mut self,
        config: &CalendarSourceConfig,
        dry_run: bool,
    ) -> SyncResult<CalendarReport> {
        let now = Utc::now();
        let result = if dry_run {
            self.plan_calendar(config, now).await
        } else {
            self.sync_calendar(config, now).await
        };

        if let Err(e) = &result {
            if e.is_calendar_fatal() {
                error!("{}: {}", config.calendar_name, e);
            } else {
                warn!("{}: skipped this cycle: {}", config.calendar_name, e);
            }
        }

        result
    }

    /// Sync every calendar when its interval has elapsed, forever. Only
    /// process termination stops it.
    pub async fn run_forever(&mut self) {
        let intervals: Vec<Duration> = self.calendars.iter().map(|c| c.interval()).collect();
        let mut schedule = Schedule::new(intervals, Instant::now());
        let calendars = self.calendars.clone();

        info!("Mirroring {} calendar(s)", calendars.len());

        loop {
            for index in schedule.due(Instant::now()) {
                let config = &calendars[index];
                // Errors are already logged per calendar
                let _ = self.run_calendar(config, false).await;
                schedule.mark_synced(index, Instant::now());
            }

            tokio::time::sleep_until(schedule.next_wake()).await;
        }
    }
}

/// Per-calendar due times for continuous mode.
#[derive(Debug, Clone)]
pub struct Schedule {
    intervals: Vec<Duration>,
    next_due: Vec<Instant>,
}

impl Schedule {
    /// Every calendar is due immediately.
    pub fn new(intervals: Vec<Duration>, now: Instant) -> Self {
        let next_due = vec![now; intervals.len()];
        Schedule { intervals, next_due }
    }

    /// Indexes of calendars due at `now`, in configuration order.
    pub fn due(&self, now: Instant) -> Vec<usize> {
        self.next_due
            .iter()
            .enumerate()
            .filter(|(_, due)| **due <= now)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn mark_synced(&mut self, index: usize, finished: Instant) {
        if let (Some(due), Some(interval)) = (self.next_due.get_mut(index), self.intervals.get(index)) {
            *due = finished + *interval;
        }
    }

    /// Earliest next due time.
    pub fn next_wake(&self) -> Instant {
        self.next_due
            .iter()
            .min()
            .copied()
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_is_due_at_start() {
        let now = Instant::now();
        let schedule = Schedule::new(vec![Duration::from_secs(60), Duration::from_secs(300)], now);
        assert_eq!(schedule.due(now), vec![0, 1]);
    }

    #[test]
    fn each_calendar_keeps_its_own_interval() {
        let start = Instant::now();
        let mut schedule =
            Schedule::new(vec![Duration::from_secs(60), Duration::from_secs(300)], start);

        schedule.mark_synced(0, start);
        schedule.mark_synced(1, start);
        assert_eq!(schedule.next_wake(), start + Duration::from_secs(60));

        let t1 = start + Duration::from_secs(60);
        assert_eq!(schedule.due(t1), vec![0]);
        schedule.mark_synced(0, t1);

        let t5 = start + Duration::from_secs(300);
        assert_eq!(schedule.due(t5), vec![0, 1]);
    }

    #[test]
    fn slow_sync_pushes_next_due() {
        let start = Instant::now();
        let mut schedule = Schedule::new(vec![Duration::from_secs(60)], start);
        let finished = start + Duration::from_secs(45);
        schedule.mark_synced(0, finished);
        assert_eq!(schedule.next_wake(), finished + Duration::from_secs(60));
    }
}
