//! Google OAuth client credentials.
//!
//! Taken from the `[google]` config table, either inline or from the client
//! secrets JSON downloaded from the Google Cloud console.

use std::path::Path;

use calmirror_core::config::GoogleConfig;
use calmirror_core::{SyncError, SyncResult};
use serde::Deserialize;

const SETUP_HINT: &str = "\
Add your Google OAuth client to the [google] table of the config:

[google]
client_id = \"your-client-id.apps.googleusercontent.com\"
client_secret = \"your-client-secret\"

or point credentials_file at the client secrets JSON.
See https://console.cloud.google.com/apis/credentials for setup.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Client secrets file layout. Desktop clients use `installed`, web clients `web`.
#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<SecretsEntry>,
    web: Option<SecretsEntry>,
}

#[derive(Deserialize)]
struct SecretsEntry {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    /// Resolve credentials from config. Inline values win over the file; a
    /// relative `credentials_file` is resolved against `config_dir`.
    pub fn from_config(config: &GoogleConfig, config_dir: &Path) -> SyncResult<Self> {
        if let (Some(client_id), Some(client_secret)) = (&config.client_id, &config.client_secret) {
            return Ok(Credentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            });
        }

        match &config.credentials_file {
            Some(file) if file.is_absolute() => Self::from_file(file),
            Some(file) => Self::from_file(&config_dir.join(file)),
            None => Err(SyncError::Config(format!(
                "Google credentials not configured.\n\n{}",
                SETUP_HINT
            ))),
        }
    }

    pub fn from_file(path: &Path) -> SyncResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read Google credentials from {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&contents).map_err(|e| match e {
            SyncError::Config(msg) => SyncError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn from_json(contents: &str) -> SyncResult<Self> {
        let file: SecretsFile = serde_json::from_str(contents)
            .map_err(|e| SyncError::Config(format!("Invalid client secrets JSON: {}", e)))?;

        let entry = file.installed.or(file.web).ok_or_else(|| {
            SyncError::Config("Client secrets JSON has no \"installed\" or \"web\" client".into())
        })?;

        Ok(Credentials {
            client_id: entry.client_id,
            client_secret: entry.client_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn inline_values_are_used() {
        let config = GoogleConfig {
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            credentials_file: Some(PathBuf::from("ignored.json")),
            token_path: None,
        };
        let creds = Credentials::from_config(&config, Path::new("/nonexistent")).unwrap();
        assert_eq!(creds.client_id, "id");
        assert_eq!(creds.client_secret, "secret");
    }

    #[test]
    fn relative_file_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("client.json"),
            r#"{"installed":{"client_id":"abc.apps.googleusercontent.com","client_secret":"s3cret","redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap();

        let config = GoogleConfig {
            credentials_file: Some(PathBuf::from("client.json")),
            ..GoogleConfig::default()
        };
        let creds = Credentials::from_config(&config, dir.path()).unwrap();
        assert_eq!(creds.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "s3cret");
    }

    #[test]
    fn web_clients_are_accepted() {
        let creds =
            Credentials::from_json(r#"{"web":{"client_id":"w","client_secret":"x"}}"#).unwrap();
        assert_eq!(creds.client_id, "w");
    }

    #[test]
    fn missing_credentials_is_a_config_error() {
        let err = Credentials::from_config(&GoogleConfig::default(), Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, SyncError::Config(msg) if msg.contains("client_id")));

        let err = Credentials::from_json(r#"{"other":{}}"#).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
