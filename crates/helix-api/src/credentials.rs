//! App credentials and the access token lifecycle.
//!
//! A [`TokenManager`] is owned by the client that uses it. The token moves through
//! `Uninitialized -> Active -> Expired -> Active`; it is fetched lazily on first use,
//! refreshed when its lifetime runs out, and invalidated when Helix rejects it.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::HelixError;
use crate::models::{ErrorResponse, TokenResponse};

/// Environment variable holding the application client id.
pub const CLIENT_ID_ENV: &str = "TWITCH_CLIENT_ID";
/// Environment variable holding the application client secret.
pub const CLIENT_SECRET_ENV: &str = "TWITCH_CLIENT_SECRET";

/// Tokens are treated as expired this long before Twitch says they are.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Application client id and secret used for the client-credentials grant.
#[derive(Clone, PartialEq, Eq)]
pub struct AppCredentials {
    client_id: String,
    client_secret: String,
}

impl AppCredentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, HelixError> {
        let client_id = client_id.into().trim().to_string();
        let client_secret = client_secret.into().trim().to_string();

        if client_id.is_empty() {
            return Err(HelixError::MissingCredential("client_id"));
        }
        if client_secret.is_empty() {
            return Err(HelixError::MissingCredential("client_secret"));
        }

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Read credentials from `TWITCH_CLIENT_ID` and `TWITCH_CLIENT_SECRET`.
    pub fn from_env() -> Result<Self, HelixError> {
        let client_id =
            std::env::var(CLIENT_ID_ENV).map_err(|_| HelixError::MissingCredential("client_id"))?;
        let client_secret = std::env::var(CLIENT_SECRET_ENV)
            .map_err(|_| HelixError::MissingCredential("client_secret"))?;
        Self::new(client_id, client_secret)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// An app access token and its expiry.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token should be refreshed before use at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + TimeDelta::seconds(EXPIRY_MARGIN_SECS) >= expires_at,
            None => false,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Lifecycle state of the app access token.
#[derive(Debug, Clone, Default)]
pub enum TokenState {
    /// No token has been requested yet.
    #[default]
    Uninitialized,
    /// A token is held and believed valid.
    Active(AccessToken),
    /// The held token ran out or was rejected and must be refreshed.
    Expired,
}

impl TokenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Active(_) => "active",
            Self::Expired => "expired",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

/// Owns the app credentials and the current access token.
pub struct TokenManager {
    credentials: AppCredentials,
    token_url: Url,
    client: Client,
    state: Mutex<TokenState>,
}

impl TokenManager {
    /// `client` must be built after a rustls provider is installed, see
    /// [`install_rustls_provider`](crate::client::install_rustls_provider).
    pub fn new(credentials: AppCredentials, token_url: Url, client: Client) -> Self {
        Self {
            credentials,
            token_url,
            client,
            state: Mutex::new(TokenState::Uninitialized),
        }
    }

    pub fn credentials(&self) -> &AppCredentials {
        &self.credentials
    }

    /// Snapshot of the current lifecycle state.
    pub async fn state(&self) -> TokenState {
        self.state.lock().await.clone()
    }

    /// Seed the manager with a token obtained elsewhere.
    pub async fn set_token(&self, token: AccessToken) {
        *self.state.lock().await = TokenState::Active(token);
    }

    /// Return a usable bearer token, fetching a new one if needed.
    ///
    /// The lock is held across the refresh so concurrent callers share a single
    /// token request.
    pub async fn bearer(&self) -> Result<String, HelixError> {
        let mut state = self.state.lock().await;

        if let TokenState::Active(token) = &*state {
            if !token.is_expired_at(Utc::now()) {
                return Ok(token.secret().to_string());
            }
            debug!("App access token reached its expiry, refreshing");
            *state = TokenState::Expired;
        }

        let token = self.fetch_token().await?;
        let bearer = token.secret().to_string();
        *state = TokenState::Active(token);
        Ok(bearer)
    }

    /// Mark `rejected` as expired.
    ///
    /// Does nothing if another request already replaced it with a fresh token.
    pub async fn invalidate(&self, rejected: &str) {
        let mut state = self.state.lock().await;
        if let TokenState::Active(token) = &*state
            && token.secret() == rejected
        {
            warn!("App access token was rejected, marking it expired");
            *state = TokenState::Expired;
        }
    }

    async fn fetch_token(&self) -> Result<AccessToken, HelixError> {
        let response = self
            .client
            .post(self.token_url.clone())
            .query(&[
                ("client_id", self.credentials.client_id()),
                ("client_secret", self.credentials.client_secret()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(HelixError::TokenRejected {
                status: status.as_u16(),
                message: ErrorResponse::describe(&body),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|_| HelixError::TokenRejected {
                status: status.as_u16(),
                message: ErrorResponse::describe(&body),
            })?;

        let expires_at = parsed
            .expires_in
            .and_then(TimeDelta::try_seconds)
            .map(|lifetime| Utc::now() + lifetime);

        info!(expires_at = ?expires_at, "Obtained app access token");
        Ok(AccessToken::new(parsed.access_token, expires_at))
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("credentials", &self.credentials)
            .field("token_url", &self.token_url.as_str())
            .finish_non_exhaustive()
    }
}
