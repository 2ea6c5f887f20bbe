use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::backend::{EventPayload, InstancePatch};
use crate::destination::DestinationEvent;
use crate::event::{InstanceKey, NormalizedEvent};
use crate::reconcile::{Operation, Plan, SeriesRef};

/// Compute the operations that bring the destination in line with the source.
///
/// Both sides must already be restricted to the same window. Source events
/// are joined to destination events by external UID; destination events
/// whose UID is gone from the source are cancelled, as are surplus
/// destination events sharing one UID.
///
/// Instances cancelled directly on the destination are left alone: the
/// `source_declined` tag tells them apart from cancellations that came from
/// the feed, and only the latter are restored when the feed withdraws them.
pub fn plan(source: &[NormalizedEvent], destination: &[DestinationEvent]) -> Plan {
    let mut by_uid: BTreeMap<&str, Vec<&DestinationEvent>> = BTreeMap::new();
    for dest in destination {
        by_uid.entry(dest.uid.as_str()).or_default().push(dest);
    }

    let mut operations = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for event in source {
        if !seen.insert(event.uid.as_str()) {
            continue;
        }

        match by_uid.get(event.uid.as_str()).and_then(|d| d.split_first()) {
            None => plan_new(event, &mut operations),
            Some((dest, surplus)) => {
                for dup in surplus {
                    operations.push(cancel_series(dup));
                }
                plan_existing(event, dest, &mut operations);
            }
        }
    }

    for (uid, dests) in &by_uid {
        if !seen.contains(uid) {
            operations.extend(dests.iter().map(|d| cancel_series(d)));
        }
    }

    Plan { operations }
}

fn cancel_series(dest: &DestinationEvent) -> Operation {
    Operation::CancelSeries {
        event_id: dest.id.clone(),
        uid: dest.uid.clone(),
        title: dest.title.clone(),
    }
}

fn plan_new(event: &NormalizedEvent, operations: &mut Vec<Operation>) {
    if event.declined {
        return;
    }

    let declined = event.declined_keys();
    let series = SeriesRef::Created(event.uid.clone());

    operations.push(Operation::CreateSeries {
        payload: EventPayload::from_source(event, declined.clone()),
    });

    for key in declined {
        operations.push(Operation::CancelInstance {
            series: series.clone(),
            uid: event.uid.clone(),
            key,
        });
    }

    for o in event.overrides.iter().filter(|o| !o.declined) {
        operations.push(Operation::OverrideInstance {
            series: series.clone(),
            uid: event.uid.clone(),
            key: o.key(),
            patch: InstancePatch::from_override(o, event.timezone.clone()),
        });
    }
}

fn plan_existing(event: &NormalizedEvent, dest: &DestinationEvent, operations: &mut Vec<Operation>) {
    if event.declined {
        operations.push(cancel_series(dest));
        return;
    }

    let series = SeriesRef::Existing(dest.id.clone());
    let instance_op = |key: &InstanceKey| (series.clone(), event.uid.clone(), key.clone());

    let source_declined = event.declined_keys();
    let cancelled = dest.cancelled_keys();
    let previously_declined = &dest.source_declined;

    // A key the destination already had cancelled is only claimed by the
    // feed if the feed was the one that cancelled it
    let tag: BTreeSet<InstanceKey> = source_declined
        .iter()
        .filter(|k| previously_declined.contains(*k) || !cancelled.contains(*k))
        .cloned()
        .collect();

    let restore: BTreeSet<InstanceKey> = previously_declined
        .intersection(&cancelled)
        .filter(|k| !source_declined.contains(*k))
        .cloned()
        .collect();

    let payload = EventPayload::from_source(event, tag.clone());
    let changed = !payload.matches(dest);

    if changed {
        operations.push(Operation::UpdateSeries {
            event_id: dest.id.clone(),
            payload,
        });
    } else if &tag != previously_declined {
        operations.push(Operation::TagSeries {
            event_id: dest.id.clone(),
            uid: event.uid.clone(),
            title: event.title.clone(),
            source_declined: tag,
        });
    }

    for key in source_declined.difference(&cancelled) {
        let (series, uid, key) = instance_op(key);
        operations.push(Operation::CancelInstance { series, uid, key });
    }

    for key in &restore {
        let (series, uid, key) = instance_op(key);
        operations.push(Operation::RestoreInstance { series, uid, key });
    }

    // A series update may drop exceptions, so every cancellation that
    // stays is written again
    if changed {
        for key in cancelled.iter().filter(|k| !restore.contains(*k)) {
            let (series, uid, key) = instance_op(key);
            operations.push(Operation::CancelInstance { series, uid, key });
        }
    }

    for o in event.overrides.iter().filter(|o| !o.declined) {
        let key = o.key();
        let restoring = restore.contains(&key);

        if cancelled.contains(&key) && !restoring {
            continue;
        }

        let patch = InstancePatch::from_override(o, event.timezone.clone());
        let up_to_date = !changed
            && !restoring
            && dest
                .instance(&key)
                .is_some_and(|i| !i.cancelled && patch.matches(i));

        if !up_to_date {
            let (series, uid, key) = instance_op(&key);
            operations.push(Operation::OverrideInstance {
                series,
                uid,
                key,
                patch,
            });
        }
    }
}
