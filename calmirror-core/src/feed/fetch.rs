//! HTTP retrieval of iCal feeds.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::sync::FeedSource;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse a feed URL, rewriting `webcal://` to `https://`.
pub fn feed_url(raw: &str) -> SyncResult<Url> {
    let raw = raw.trim();
    let rewritten = match raw.strip_prefix("webcal://") {
        Some(rest) => format!("https://{}", rest),
        None => raw.to_string(),
    };

    let url = Url::parse(&rewritten)
        .map_err(|e| SyncError::Config(format!("Invalid feed url '{}': {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SyncError::Config(format!(
            "Unsupported feed url scheme '{}' in {}",
            other, raw
        ))),
    }
}

/// Fetches feeds over HTTP with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    client: reqwest::Client,
}

impl HttpFeed {
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("calmirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Fetch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpFeed { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self, url: &str) -> SyncResult<String> {
        let url = feed_url(url)?;
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SyncError::Fetch(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!("{} returned {}", url, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Fetch(format!("{}: {}", url, e)))?;

        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}
