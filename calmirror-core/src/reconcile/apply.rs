use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error, warn};

use crate::backend::{CalendarBackend, Destination};
use crate::error::SyncResult;
use crate::reconcile::{Operation, Plan, SeriesRef};

/// What happened when a plan was applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: usize,
    pub updated: usize,
    pub cancelled: usize,
    pub instance_writes: usize,
    pub failed: usize,
    /// Instance operations dropped because their series was never created
    pub skipped: usize,
}

impl ApplyReport {
    /// Remote writes that succeeded.
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.cancelled + self.instance_writes
    }

    pub fn merge(&mut self, other: &ApplyReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.cancelled += other.cancelled;
        self.instance_writes += other.instance_writes;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

impl fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} cancelled, {} instance writes",
            self.created, self.updated, self.cancelled, self.instance_writes
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        Ok(())
    }
}

/// Apply a plan in order.
///
/// A failed operation is logged and counted, and the rest of the plan still
/// runs. Instance operations on a series whose creation failed are skipped.
/// Authentication failures stop the plan and are returned, since every
/// following call would fail the same way.
pub async fn apply<B>(backend: &B, destination: &Destination, plan: &Plan) -> SyncResult<ApplyReport>
where
    B: CalendarBackend + ?Sized,
{
    let mut report = ApplyReport::default();
    let mut created: HashMap<&str, String> = HashMap::new();

    for op in plan.iter() {
        let series_id = match op {
            Operation::CancelInstance { series, .. }
            | Operation::RestoreInstance { series, .. }
            | Operation::OverrideInstance { series, .. } => match series {
                SeriesRef::Existing(id) => Some(id.clone()),
                SeriesRef::Created(uid) => match created.get(uid.as_str()) {
                    Some(id) => Some(id.clone()),
                    None => {
                        warn!("Skipping {}: series was not created", op);
                        report.skipped += 1;
                        continue;
                    }
                },
            },
            _ => None,
        };
        let series_id = series_id.as_deref().unwrap_or_default();

        debug!("{}", op);

        let result = match op {
            Operation::CreateSeries { payload } => {
                backend.create_event(destination, payload).await.map(|id| {
                    created.insert(payload.uid.as_str(), id);
                    report.created += 1;
                })
            }
            Operation::UpdateSeries { event_id, payload } => backend
                .update_event(destination, event_id, payload)
                .await
                .map(|_| report.updated += 1),
            Operation::TagSeries {
                event_id,
                uid,
                source_declined,
                ..
            } => backend
                .tag_event(destination, event_id, uid, source_declined)
                .await
                .map(|_| report.updated += 1),
            Operation::CancelSeries { event_id, .. } => backend
                .cancel_event(destination, event_id)
                .await
                .map(|_| report.cancelled += 1),
            Operation::CancelInstance { key, .. } => backend
                .cancel_instance(destination, series_id, key)
                .await
                .map(|_| report.instance_writes += 1),
            Operation::RestoreInstance { key, .. } => backend
                .restore_instance(destination, series_id, key)
                .await
                .map(|_| report.instance_writes += 1),
            Operation::OverrideInstance { key, patch, .. } => backend
                .override_instance(destination, series_id, key, patch)
                .await
                .map(|_| report.instance_writes += 1),
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_calendar_fatal() => {
                error!("{} failed: {}", op, e);
                return Err(e);
            }
            Err(e) => {
                error!("{} failed: {}", op, e);
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
