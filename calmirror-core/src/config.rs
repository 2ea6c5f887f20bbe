//! calmirror configuration.
//!
//! Lives at `~/.config/calmirror/config.toml`:
//!
//! ```toml
//! [[calendars]]
//! url = "https://example.com/team.ics"
//! calendar_name = "Team"
//! days_back = 30
//! days_forward = 60
//! sync_interval = 5
//!
//! [google]
//! client_id = "...apps.googleusercontent.com"
//! client_secret = "..."
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

pub const DEFAULT_DAYS_BACK: i64 = 30;
pub const DEFAULT_DAYS_FORWARD: i64 = 60;
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 5;

/// A century either way of now
pub const MAX_WINDOW_DAYS: i64 = 36_500;
/// One year
pub const MAX_SYNC_INTERVAL_MINUTES: u64 = 525_600;

fn default_days_back() -> i64 {
    DEFAULT_DAYS_BACK
}

fn default_days_forward() -> i64 {
    DEFAULT_DAYS_FORWARD
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_MINUTES
}

/// One feed and the destination calendar it is mirrored into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSourceConfig {
    pub url: String,

    #[serde(alias = "calendarName")]
    pub calendar_name: String,

    #[serde(default = "default_days_back", alias = "daysBack")]
    pub days_back: i64,

    #[serde(default = "default_days_forward", alias = "daysForward")]
    pub days_forward: i64,

    /// Minutes between syncs of this calendar in continuous mode
    #[serde(default = "default_sync_interval", alias = "syncInterval")]
    pub sync_interval: u64,
}

impl CalendarSourceConfig {
    pub fn interval(&self) -> std::time::Duration {
        let minutes = self.sync_interval.min(MAX_SYNC_INTERVAL_MINUTES);
        std::time::Duration::from_secs(minutes.saturating_mul(60))
    }
}

/// Google OAuth client settings. Either `client_id`/`client_secret` or a
/// `credentials_file` downloaded from the Google Cloud console.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,

    /// Where the OAuth token is cached. Defaults to `token.toml` next to the config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub calendars: Vec<CalendarSourceConfig>,

    #[serde(default)]
    pub google: GoogleConfig,

    /// Where this config was loaded from
    #[serde(skip)]
    pub path: PathBuf,
}

impl MirrorConfig {
    pub fn config_dir() -> SyncResult<PathBuf> {
        Ok(dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".into()))?
            .join("calmirror"))
    }

    pub fn default_path() -> SyncResult<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load and validate the config at `path`.
    ///
    /// A missing file is fatal: a sample is written next to it and the error
    /// tells the user where to find it.
    pub fn load(path: &Path) -> SyncResult<Self> {
        if !path.exists() {
            let sample = sample_path(path);
            write_sample(&sample)?;
            return Err(SyncError::Config(format!(
                "Config file {} not found.\n\n\
                A sample was written to {}.\n\
                Rename it to {} and fill in your calendars.",
                path.display(),
                sample.display(),
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Could not read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&contents)
            .map_err(|e| SyncError::Config(format!("{} ({})", e, path.display())))?;
        config.path = path.to_path_buf();

        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> SyncResult<Self> {
        let config: MirrorConfig = toml::from_str(contents)
            .map_err(|e| SyncError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> SyncResult<()> {
        if self.calendars.is_empty() {
            return Err(SyncError::Config(
                "No calendars configured. Add at least one [[calendars]] entry".into(),
            ));
        }

        let mut names = HashSet::new();
        for cal in &self.calendars {
            if cal.url.trim().is_empty() {
                return Err(SyncError::Config(format!(
                    "Calendar '{}' has an empty url",
                    cal.calendar_name
                )));
            }
            if cal.calendar_name.trim().is_empty() {
                return Err(SyncError::Config(format!(
                    "Calendar with url {} has an empty calendar_name",
                    cal.url
                )));
            }
            if cal.days_back < 0 || cal.days_forward < 0 {
                return Err(SyncError::Config(format!(
                    "Calendar '{}': days_back and days_forward must not be negative",
                    cal.calendar_name
                )));
            }
            if cal.days_back > MAX_WINDOW_DAYS || cal.days_forward > MAX_WINDOW_DAYS {
                return Err(SyncError::Config(format!(
                    "Calendar '{}': days_back and days_forward must be at most {}",
                    cal.calendar_name, MAX_WINDOW_DAYS
                )));
            }
            if cal.sync_interval == 0 {
                return Err(SyncError::Config(format!(
                    "Calendar '{}': sync_interval must be at least 1 minute",
                    cal.calendar_name
                )));
            }
            if cal.sync_interval > MAX_SYNC_INTERVAL_MINUTES {
                return Err(SyncError::Config(format!(
                    "Calendar '{}': sync_interval must be at most {} minutes",
                    cal.calendar_name, MAX_SYNC_INTERVAL_MINUTES
                )));
            }
            if !names.insert(cal.calendar_name.as_str()) {
                return Err(SyncError::Config(format!(
                    "Calendar '{}' is configured twice",
                    cal.calendar_name
                )));
            }
        }

        Ok(())
    }

    /// Calendars to work on, optionally restricted to one by name.
    pub fn select(&self, name: Option<&str>) -> SyncResult<Vec<CalendarSourceConfig>> {
        match name {
            None => Ok(self.calendars.clone()),
            Some(name) => match self.calendars.iter().find(|c| c.calendar_name == name) {
                Some(cal) => Ok(vec![cal.clone()]),
                None => {
                    let available: Vec<_> =
                        self.calendars.iter().map(|c| c.calendar_name.as_str()).collect();
                    Err(SyncError::Config(format!(
                        "Calendar '{}' not found. Available: {}",
                        name,
                        available.join(", ")
                    )))
                }
            },
        }
    }

    /// Token cache location, relative paths resolved against the config file.
    pub fn token_path(&self) -> PathBuf {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        match &self.google.token_path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => dir.join(p),
            None => dir.join("token.toml"),
        }
    }
}

/// `config.toml` -> `config.toml.sample`
pub fn sample_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "config.toml".into());
    name.push(".sample");
    path.with_file_name(name)
}

/// Write a sample config with one example calendar.
pub fn write_sample(path: &Path) -> SyncResult<()> {
    let contents = format!(
        "\
# calmirror configuration
#
# One [[calendars]] entry per iCal feed. Each feed is mirrored into its own
# Google calendar, created on first sync if it does not exist.

[[calendars]]
url = \"https://example.com/your-calendar.ics\"
calendar_name = \"Example Calendar\"
days_back = {}
days_forward = {}
sync_interval = {}

[google]
# OAuth client from https://console.cloud.google.com/apis/credentials
client_id = \"your-client-id.apps.googleusercontent.com\"
client_secret = \"your-client-secret\"
# Or point at the downloaded client secrets file instead:
# credentials_file = \"credentials.json\"
",
        DEFAULT_DAYS_BACK, DEFAULT_DAYS_FORWARD, DEFAULT_SYNC_INTERVAL_MINUTES
    );

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            SyncError::Config(format!("Could not create config directory: {e}"))
        })?;
    }

    std::fs::write(path, contents)
        .map_err(|e| SyncError::Config(format!("Could not write sample config: {e}")))?;

    Ok(())
}
