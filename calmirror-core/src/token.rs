//! OAuth token persistence.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// A cached OAuth access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        StoredToken {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }

    /// Expired, or about to be within a minute.
    pub fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(60) >= self.expires_at
    }
}

/// Where tokens live between runs.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> SyncResult<Option<StoredToken>>;
    fn save(&self, token: &StoredToken) -> SyncResult<()>;
}

/// TOML file on disk, readable by the owner only.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTokenStore { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> SyncResult<Option<StoredToken>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let token = toml::from_str(&contents).map_err(|e| {
            SyncError::Auth(format!(
                "Failed to parse token from {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(Some(token))
    }

    fn save(&self, token: &StoredToken) -> SyncResult<()> {
        let contents = toml::to_string_pretty(token)
            .map_err(|e| SyncError::Auth(format!("Failed to serialize token: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&self.path, contents)?;

        // Owner-only (0600) since the file holds OAuth tokens
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

/// Keeps the token in memory only.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<StoredToken>>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<StoredToken>) -> Self {
        MemoryTokenStore {
            token: Mutex::new(token),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> SyncResult<Option<StoredToken>> {
        let guard = self
            .token
            .lock()
            .map_err(|_| SyncError::Auth("Token store lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save(&self, token: &StoredToken) -> SyncResult<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| SyncError::Auth("Token store lock poisoned".into()))?;
        *guard = Some(token.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested/token.toml"));

        assert_eq!(store.load().unwrap(), None);

        let token = StoredToken::new("access".into(), "refresh".into(), 3600);
        store.save(&token).unwrap();
        assert_eq!(store.load().unwrap(), Some(token));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn corrupt_token_file_is_an_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let err = FileTokenStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SyncError::Auth(_)));
    }

    #[test]
    fn expiry_has_a_margin() {
        assert!(StoredToken::new("a".into(), "r".into(), 30).is_expired());
        assert!(!StoredToken::new("a".into(), "r".into(), 3600).is_expired());
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryTokenStore::default();
        store.save(&StoredToken::new("one".into(), "r".into(), 3600)).unwrap();
        store.save(&StoredToken::new("two".into(), "r".into(), 3600)).unwrap();
        assert_eq!(store.load().unwrap().unwrap().access_token, "two");
    }
}
