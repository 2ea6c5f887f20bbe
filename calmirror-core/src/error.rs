//! Error types for calmirror.

use thiserror::Error;

/// Errors that can occur while mirroring a feed.
///
/// `Config` is fatal at startup. `Fetch` and `Parse` skip one calendar for
/// the current cycle, `Remote` abandons a single operation, and `Auth`
/// stops work on the calendar that hit it.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to fetch feed: {0}")]
    Fetch(String),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Remote calendar error: {0}")]
    Remote(String),

    /// The remote calendar or event no longer exists
    #[error("Not found on remote calendar: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether the error should stop work on the current calendar instead of
    /// just the current operation.
    pub fn is_calendar_fatal(&self) -> bool {
        matches!(self, SyncError::Auth(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}

/// Result type alias for calmirror operations.
pub type SyncResult<T> = Result<T, SyncError>;
