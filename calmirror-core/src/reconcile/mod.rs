//! Reconciliation of a feed against its destination calendar.
//!
//! `plan` is pure: it compares normalized source events with the listed
//! destination events and returns the operations needed. `apply` performs
//! them against a `CalendarBackend`, one at a time.

mod apply;
mod plan;

use std::collections::BTreeSet;
use std::fmt;

pub use apply::{ApplyReport, apply};
pub use plan::plan;

use crate::backend::{EventPayload, InstancePatch};
use crate::event::InstanceKey;

/// The series an instance operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesRef {
    /// A series that already exists on the destination
    Existing(String),
    /// A series created earlier in the same plan, by external UID
    Created(String),
}

/// One remote write.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    CreateSeries {
        payload: EventPayload,
    },
    UpdateSeries {
        event_id: String,
        payload: EventPayload,
    },
    /// Rewrite only the sync-managed extended properties
    TagSeries {
        event_id: String,
        uid: String,
        title: String,
        source_declined: BTreeSet<InstanceKey>,
    },
    CancelSeries {
        event_id: String,
        uid: String,
        title: String,
    },
    CancelInstance {
        series: SeriesRef,
        uid: String,
        key: InstanceKey,
    },
    RestoreInstance {
        series: SeriesRef,
        uid: String,
        key: InstanceKey,
    },
    OverrideInstance {
        series: SeriesRef,
        uid: String,
        key: InstanceKey,
        patch: InstancePatch,
    },
}

impl Operation {
    pub fn uid(&self) -> &str {
        match self {
            Operation::CreateSeries { payload } | Operation::UpdateSeries { payload, .. } => {
                &payload.uid
            }
            Operation::TagSeries { uid, .. }
            | Operation::CancelSeries { uid, .. }
            | Operation::CancelInstance { uid, .. }
            | Operation::RestoreInstance { uid, .. }
            | Operation::OverrideInstance { uid, .. } => uid,
        }
    }

    pub fn is_instance_op(&self) -> bool {
        matches!(
            self,
            Operation::CancelInstance { .. }
                | Operation::RestoreInstance { .. }
                | Operation::OverrideInstance { .. }
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateSeries { payload } => {
                write!(f, "+ {} ({}) {}", payload.title, payload.uid, payload.start)
            }
            Operation::UpdateSeries { payload, .. } => {
                write!(f, "~ {} ({})", payload.title, payload.uid)
            }
            Operation::TagSeries { title, uid, .. } => write!(f, "~ {} ({}) tags", title, uid),
            Operation::CancelSeries { title, uid, .. } => write!(f, "- {} ({})", title, uid),
            Operation::CancelInstance { uid, key, .. } => write!(f, "- {} @ {}", uid, key),
            Operation::RestoreInstance { uid, key, .. } => write!(f, "+ {} @ {}", uid, key),
            Operation::OverrideInstance { uid, key, patch, .. } => {
                write!(f, "~ {} @ {} -> {} {}", uid, key, patch.title, patch.start)
            }
        }
    }
}

/// Operations for one calendar, in the order they must be applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub operations: Vec<Operation>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }
}
