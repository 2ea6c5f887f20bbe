//! OAuth: the one-time consent flow and access tokens for API calls.

use anyhow::{Context, Result};
use async_trait::async_trait;
use calmirror_core::token::{StoredToken, TokenStore};
use calmirror_core::{SyncError, SyncResult};
use google_calendar::Client;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::credentials::Credentials;

pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/calendar"];

const REDIRECT_PORT: u16 = 8085;

pub fn redirect_uri() -> String {
    format!("http://localhost:{}/callback", REDIRECT_PORT)
}

fn redirect_address() -> String {
    format!("127.0.0.1:{}", REDIRECT_PORT)
}

/// Source of bearer tokens for Calendar API requests.
#[async_trait]
pub trait AccessTokens: Send + Sync {
    /// A token believed to be valid, refreshed first if it has expired.
    async fn access_token(&self) -> SyncResult<String>;

    /// Called when the API rejected the current token.
    async fn refresh(&self) -> SyncResult<()>;
}

/// A fixed token that cannot be refreshed.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokens for StaticToken {
    async fn access_token(&self) -> SyncResult<String> {
        Ok(self.0.clone())
    }

    async fn refresh(&self) -> SyncResult<()> {
        Err(SyncError::Auth("Access token was rejected".into()))
    }
}

fn client_for(credentials: &Credentials, access_token: String, refresh_token: String) -> Client {
    Client::new(
        credentials.client_id.clone(),
        credentials.client_secret.clone(),
        redirect_uri(),
        access_token,
        refresh_token,
    )
}

/// Cached tokens for the configured account, refreshed through the
/// google-calendar client and written back to the store.
pub struct Session<S> {
    credentials: Credentials,
    store: S,
    token: Mutex<Option<StoredToken>>,
}

impl<S: TokenStore> Session<S> {
    pub fn new(credentials: Credentials, store: S) -> Self {
        Session {
            credentials,
            store,
            token: Mutex::new(None),
        }
    }

    async fn refreshed(&self, token: &StoredToken) -> SyncResult<StoredToken> {
        let client = client_for(
            &self.credentials,
            token.access_token.clone(),
            token.refresh_token.clone(),
        );

        let access_token = client
            .refresh_access_token()
            .await
            .map_err(|e| SyncError::Auth(format!("Failed to refresh token: {}", e)))?;

        // Google usually omits the refresh token on refresh
        let refresh_token = if access_token.refresh_token.is_empty() {
            token.refresh_token.clone()
        } else {
            access_token.refresh_token
        };

        let refreshed = StoredToken::new(
            access_token.access_token,
            refresh_token,
            access_token.expires_in,
        );
        self.store.save(&refreshed)?;

        Ok(refreshed)
    }

    fn cached(&self, slot: &Option<StoredToken>) -> SyncResult<StoredToken> {
        match slot {
            Some(token) => Ok(token.clone()),
            None => self.store.load()?.ok_or_else(|| {
                SyncError::Auth("Not authorized. Run `calmirror auth` first.".into())
            }),
        }
    }
}

#[async_trait]
impl<S: TokenStore> AccessTokens for Session<S> {
    async fn access_token(&self) -> SyncResult<String> {
        let mut slot = self.token.lock().await;
        let mut token = self.cached(&slot)?;

        if token.is_expired() {
            debug!("Access token expired, refreshing");
            token = self.refreshed(&token).await?;
        }

        let access_token = token.access_token.clone();
        *slot = Some(token);
        Ok(access_token)
    }

    async fn refresh(&self) -> SyncResult<()> {
        let mut slot = self.token.lock().await;
        let token = self.cached(&slot)?;
        *slot = Some(self.refreshed(&token).await?);
        Ok(())
    }
}

/// Accept one request on the redirect port and pull `code` and `state` out of it.
async fn wait_for_callback() -> Result<(String, String)> {
    let listener = TcpListener::bind(redirect_address())
        .await
        .with_context(|| format!("Failed to bind to port {}", REDIRECT_PORT))?;

    eprintln!("Waiting for OAuth callback on port {}...", REDIRECT_PORT);

    let (mut stream, _) = listener
        .accept()
        .await
        .context("Failed to accept connection")?;

    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let url_part = request_line
        .split_whitespace()
        .nth(1)
        .context("Invalid request")?;

    let url = url::Url::parse(&format!("http://localhost{}", url_part))?;

    let query = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.to_string())
    };

    if let Some(error) = query("error") {
        anyhow::bail!("Authorization was denied: {}", error);
    }

    let code = query("code").context("No code in callback")?;
    let state = query("state").context("No state in callback")?;

    let response = "HTTP/1.1 200 OK\r\n\
        Content-Type: text/html\r\n\
        Connection: close\r\n\
        \r\n\
        <html><body>\
        <h1>calmirror is authorized</h1>\
        <p>You can close this window and return to the terminal.</p>\
        </body></html>";

    write_half.write_all(response.as_bytes()).await?;
    write_half.flush().await?;

    Ok((code, state))
}

/// Run the interactive consent flow and cache the resulting token.
pub async fn authorize(credentials: &Credentials, store: &dyn TokenStore) -> Result<()> {
    let mut client = client_for(credentials, String::new(), String::new());

    let scopes: Vec<String> = SCOPES.iter().map(|s| s.to_string()).collect();
    let auth_url = client.user_consent_url(&scopes);

    eprintln!("\nOpen this URL in your browser to authorize calmirror:\n");
    eprintln!("{}\n", auth_url);

    if open::that(&auth_url).is_err() {
        eprintln!("(Could not open browser automatically, please copy the URL above)");
    }

    let (code, state) = wait_for_callback().await?;

    eprintln!("\nReceived authorization code, exchanging for tokens...");

    let access_token = client
        .get_access_token(&code, &state)
        .await
        .context("Failed to exchange code for tokens")?;

    if access_token.refresh_token.is_empty() {
        anyhow::bail!(
            "Google did not return a refresh token. Remove calmirror's access at \
            https://myaccount.google.com/permissions and run `calmirror auth` again."
        );
    }

    let token = StoredToken::new(
        access_token.access_token,
        access_token.refresh_token,
        access_token.expires_in,
    );
    store.save(&token).context("Failed to save token")?;

    info!("Authorization complete");

    Ok(())
}
