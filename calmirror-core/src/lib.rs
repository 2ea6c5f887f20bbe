//! Core of calmirror: normalizing iCal feeds, planning and applying the
//! remote operations that mirror them, and the sync loop driving it all.

pub mod backend;
pub mod config;
pub mod destination;
pub mod error;
pub mod event;
pub mod feed;
pub mod recurrence;
pub mod reconcile;
pub mod sync;
pub mod token;
pub mod window;

pub use error::{SyncError, SyncResult};
