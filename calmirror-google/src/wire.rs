//! Accessors over `google_calendar::types::Event` for the fields calmirror
//! manages.
//!
//! Extended properties are free-form string maps on the wire; they are read
//! and written through their JSON form so calmirror never depends on how the
//! generated types model them.

use std::collections::BTreeMap;

use calmirror_core::{SyncError, SyncResult};
use google_calendar::types::Event;

pub const CANCELLED: &str = "cancelled";
pub const CONFIRMED: &str = "confirmed";

pub fn is_cancelled(event: &Event) -> bool {
    event.status == CANCELLED
}

/// The event's private extended properties, empty when it has none.
pub fn private_properties(event: &Event) -> BTreeMap<String, String> {
    serde_json::to_value(&event.extended_properties)
        .ok()
        .and_then(|props| props.get("private").cloned())
        .and_then(|private| serde_json::from_value(private).ok())
        .unwrap_or_default()
}

pub fn private_property(event: &Event, key: &str) -> Option<String> {
    private_properties(event).remove(key)
}

/// Replace the event's private extended properties.
pub fn set_private_properties(
    event: &mut Event,
    private: &BTreeMap<String, String>,
) -> SyncResult<()> {
    let props = serde_json::json!({ "private": private });
    event.extended_properties = serde_json::from_value(props)
        .map_err(|e| SyncError::Remote(format!("Invalid extended properties: {}", e)))?;
    Ok(())
}
