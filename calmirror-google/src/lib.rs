//! Google Calendar backend for calmirror.
//!
//! Every Calendar v3 call, OAuth consent and token refresh go through the
//! `google-calendar` client. The token itself is cached on disk through
//! calmirror's `TokenStore`.

pub mod auth;
pub mod client;
pub mod convert;
pub mod credentials;
pub mod wire;

use calmirror_core::SyncResult;
use calmirror_core::config::MirrorConfig;
use calmirror_core::token::FileTokenStore;

pub use auth::{AccessTokens, Session, StaticToken, authorize};
pub use client::GoogleCalendar;
pub use credentials::Credentials;

/// Credentials and token store as configured in `config`.
pub fn session(config: &MirrorConfig) -> SyncResult<Session<FileTokenStore>> {
    let config_dir = config.path.parent().unwrap_or(std::path::Path::new("."));
    let credentials = Credentials::from_config(&config.google, config_dir)?;
    Ok(Session::new(
        credentials,
        FileTokenStore::new(config.token_path()),
    ))
}

/// The backend the sync loop writes through.
pub fn backend(config: &MirrorConfig) -> SyncResult<GoogleCalendar<Session<FileTokenStore>>> {
    Ok(GoogleCalendar::new(session(config)?))
}
