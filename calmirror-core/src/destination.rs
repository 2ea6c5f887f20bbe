//! The remote calendar's view of a mirrored event.

use std::collections::BTreeSet;

use crate::event::{EventTime, InstanceKey};

/// A sync-managed series or single event as listed from the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationEvent {
    /// Remote id, stable for the lifetime of the remote event
    pub id: String,
    /// External UID carried as a private extended property
    pub uid: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub timezone: Option<String>,
    pub recurrence: Vec<String>,
    /// Instances cancelled because the feed declined them
    pub source_declined: BTreeSet<InstanceKey>,
    /// Exceptions the remote service holds for this series
    pub instances: Vec<DestinationInstance>,
}

/// One modified or cancelled occurrence of a destination series.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationInstance {
    pub id: String,
    pub original_start: EventTime,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub title: Option<String>,
    pub cancelled: bool,
}

impl DestinationInstance {
    pub fn key(&self) -> InstanceKey {
        self.original_start.instance_key()
    }
}

impl DestinationEvent {
    pub fn is_recurring(&self) -> bool {
        !self.recurrence.is_empty()
    }

    /// Keys of every cancelled instance, whoever cancelled it.
    pub fn cancelled_keys(&self) -> BTreeSet<InstanceKey> {
        self.instances
            .iter()
            .filter(|i| i.cancelled)
            .map(DestinationInstance::key)
            .collect()
    }

    pub fn instance(&self, key: &InstanceKey) -> Option<&DestinationInstance> {
        self.instances.iter().find(|i| &i.key() == key)
    }
}
