mod support;

use calmirror_core::backend::{Destination, SOURCE_PROPERTY};
use calmirror_core::config::CalendarSourceConfig;
use calmirror_core::event::{EventTime, InstanceKey, InstanceOverride, NormalizedEvent};
use calmirror_core::reconcile::{self, ApplyReport, Operation, Plan, SeriesRef};
use calmirror_core::sync::Mirror;
use calmirror_core::window::SyncWindow;
use chrono::{DateTime, TimeZone, Utc};
use support::{FakeCalendar, StaticFeed, ics, vevent};

const FEED: &str = "https://example.com/team.ics";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 8, 12, 0, 0).unwrap()
}

fn window() -> SyncWindow {
    SyncWindow::around(now(), 30, 60)
}

fn destination() -> Destination {
    Destination {
        calendar_id: "cal1".into(),
        source_url: FEED.into(),
    }
}

fn at(d: u32, h: u32) -> EventTime {
    EventTime::DateTime(Utc.with_ymd_and_hms(2025, 1, d, h, 0, 0).unwrap())
}

fn key(d: u32) -> InstanceKey {
    at(d, 10).instance_key()
}

fn single(uid: &str, title: &str, d: u32) -> NormalizedEvent {
    NormalizedEvent {
        uid: uid.into(),
        title: title.into(),
        description: None,
        location: None,
        start: at(d, 10),
        end: at(d, 11),
        timezone: None,
        recurrence: vec![],
        overrides: vec![],
        declined: false,
    }
}

fn weekly(uid: &str, title: &str) -> NormalizedEvent {
    NormalizedEvent {
        recurrence: vec!["RRULE:FREQ=WEEKLY;BYDAY=MO".into()],
        ..single(uid, title, 6)
    }
}

fn decline(event: &mut NormalizedEvent, d: u32) {
    event.overrides.push(InstanceOverride {
        original_start: at(d, 10),
        title: event.title.clone(),
        start: at(d, 10),
        end: at(d, 11),
        declined: true,
    });
}

async fn sync(fake: &FakeCalendar, source: &[NormalizedEvent]) -> (Plan, ApplyReport) {
    let existing = fake_list(fake).await;
    let plan = reconcile::plan(source, &existing);
    let report = reconcile::apply(fake, &destination(), &plan).await.unwrap();
    (plan, report)
}

async fn fake_list(fake: &FakeCalendar) -> Vec<calmirror_core::destination::DestinationEvent> {
    use calmirror_core::backend::CalendarBackend;
    fake.list_events(&destination(), &window()).await.unwrap()
}

#[tokio::test]
async fn second_sync_is_a_no_op() {
    let fake = FakeCalendar::new();
    let source = vec![
        single("a", "Alpha", 9),
        single("b", "Beta", 10),
        weekly("c", "Gamma"),
    ];

    let (_, first) = sync(&fake, &source).await;
    assert_eq!(first.created, 3);
    assert_eq!(fake_list(&fake).await.len(), source.len());

    let (plan, second) = sync(&fake, &source).await;
    assert!(plan.is_empty(), "unexpected operations: {:?}", plan);
    assert_eq!(second.writes(), 0);
}

#[tokio::test]
async fn declining_one_instance_touches_only_that_instance() {
    let fake = FakeCalendar::new();
    let mut series = weekly("w", "Standup");
    sync(&fake, std::slice::from_ref(&series)).await;

    decline(&mut series, 13);
    let (plan, _) = sync(&fake, std::slice::from_ref(&series)).await;

    let cancels: Vec<_> = plan
        .iter()
        .filter(|op| matches!(op, Operation::CancelInstance { .. }))
        .collect();
    assert_eq!(cancels.len(), 1);
    assert!(matches!(cancels[0], Operation::CancelInstance { key: k, .. } if *k == key(13)));
    assert!(!plan.iter().any(|op| matches!(
        op,
        Operation::UpdateSeries { .. } | Operation::CancelSeries { .. }
    )));

    assert!(fake.is_instance_cancelled("w", &key(13)));
    assert!(!fake.is_instance_cancelled("w", &key(20)));

    let (again, _) = sync(&fake, &[series]).await;
    assert!(again.is_empty());
}

#[tokio::test]
async fn destination_decline_survives_series_update() {
    let fake = FakeCalendar::new();
    let mut series = weekly("w", "Standup");
    sync(&fake, std::slice::from_ref(&series)).await;

    fake.decline_on_destination("w", &key(20));

    series.location = Some("Room 2".into());
    let (plan, report) = sync(&fake, std::slice::from_ref(&series)).await;
    assert!(plan.iter().any(|op| matches!(op, Operation::UpdateSeries { .. })));
    assert_eq!(report.failed, 0);

    assert!(fake.is_instance_cancelled("w", &key(20)));
    assert_eq!(fake.event("w").unwrap().payload.location.as_deref(), Some("Room 2"));

    // Nothing left to do, and the decline is still not claimed by the feed
    let (again, _) = sync(&fake, &[series]).await;
    assert!(again.is_empty());
    assert!(fake.event("w").unwrap().payload.source_declined.is_empty());
}

#[tokio::test]
async fn withdrawn_source_decline_is_restored_but_destination_decline_is_not() {
    let fake = FakeCalendar::new();
    let mut series = weekly("w", "Standup");
    decline(&mut series, 13);
    sync(&fake, std::slice::from_ref(&series)).await;
    fake.decline_on_destination("w", &key(20));

    assert!(fake.is_instance_cancelled("w", &key(13)));

    series.overrides.clear();
    let (plan, _) = sync(&fake, std::slice::from_ref(&series)).await;
    assert!(plan.iter().any(|op| matches!(op, Operation::RestoreInstance { key: k, .. } if *k == key(13))));

    assert!(!fake.is_instance_cancelled("w", &key(13)));
    assert!(fake.is_instance_cancelled("w", &key(20)));
}

#[tokio::test]
async fn removed_event_cancels_exactly_that_event() {
    let fake = FakeCalendar::new();
    let source = vec![single("a", "Alpha", 9), single("b", "Beta", 10)];
    sync(&fake, &source).await;

    let (plan, report) = sync(&fake, &source[..1]).await;
    assert_eq!(plan.len(), 1);
    assert!(matches!(&plan.operations[0], Operation::CancelSeries { uid, .. } if uid == "b"));
    assert_eq!(report.cancelled, 1);

    let live: Vec<_> = fake.live_events().into_iter().map(|e| e.payload.uid).collect();
    assert_eq!(live, vec!["a".to_string()]);
}

#[tokio::test]
async fn failed_create_skips_its_instance_operations_only() {
    let fake = FakeCalendar::new();
    fake.fail_create_for("w");

    let mut series = weekly("w", "Standup");
    decline(&mut series, 13);
    let source = vec![series, single("a", "Alpha", 9)];

    let (plan, report) = sync(&fake, &source).await;
    assert!(plan.iter().any(|op| matches!(
        op,
        Operation::CancelInstance { series: SeriesRef::Created(uid), .. } if uid == "w"
    )));
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.created, 1);
    assert!(fake.event("a").is_some());
}

#[tokio::test]
async fn auth_failure_stops_the_plan() {
    let fake = FakeCalendar::new();
    fake.break_auth();

    let plan = reconcile::plan(&[single("a", "Alpha", 9)], &[]);
    let result = reconcile::apply(&fake, &destination(), &plan).await;
    assert!(matches!(result, Err(calmirror_core::SyncError::Auth(_))));
}

#[tokio::test]
async fn team_sync_scenario() {
    let team_sync = vevent("abc123", "Team Sync", "20250110T100000Z", "20250110T110000Z");
    let feed = StaticFeed::new();
    feed.set(FEED, ics(&[&team_sync]));

    let config = CalendarSourceConfig {
        url: FEED.into(),
        calendar_name: "Team".into(),
        days_back: 30,
        days_forward: 60,
        sync_interval: 5,
    };
    let fake = FakeCalendar::new();
    let mut mirror = Mirror::new(fake.clone(), feed.clone(), vec![config.clone()]);

    // First sync creates one tagged event
    let first = mirror.sync_calendar(&config, now()).await.unwrap();
    assert_eq!(first.applied.unwrap().created, 1);
    let events = fake.live_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload.uid, "abc123");
    assert_eq!(events[0].payload.title, "Team Sync");
    assert_eq!(events[0].source_url, FEED, "{} tag", SOURCE_PROPERTY);

    // Second sync writes nothing
    let writes = fake.writes();
    let second = mirror.sync_calendar(&config, now()).await.unwrap();
    assert!(second.plan.is_empty());
    assert_eq!(fake.writes(), writes);

    // Removing abc123 from the feed cancels it and nothing else
    feed.set(FEED, ics(&[]));
    let third = mirror.sync_calendar(&config, now()).await.unwrap();
    assert_eq!(third.plan.len(), 1);
    assert_eq!(
        third.applied.unwrap(),
        ApplyReport {
            cancelled: 1,
            ..ApplyReport::default()
        }
    );
    assert_eq!(fake.writes(), writes + 1);
    assert!(fake.live_events().is_empty());
}
