//! Helix HTTP client.
//!
//! Handles the access token, batching and rate limit backoff so callers only see
//! merged results or a terminal error.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode, header::HeaderMap};
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};
use url::Url;

use crate::batch::{MAX_BATCH_SIZE, batch_count, chunked};
use crate::credentials::{AppCredentials, TokenManager};
use crate::error::HelixError;
use crate::models::{ErrorResponse, HelixResponse, Stream, User};

/// Default Helix API base URL.
pub const HELIX_URL: &str = "https://api.twitch.tv/helix/";
/// Default OAuth token endpoint.
pub const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Header carrying the epoch second at which the rate limit bucket refills.
const RATELIMIT_RESET_HEADER: &str = "ratelimit-reset";

/// Upper bound for a single rate limit wait.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Configuration for [`HelixClient`].
#[derive(Debug, Clone)]
pub struct HelixConfig {
    /// Base URL for Helix endpoints (must end with `/`).
    pub api_base: Url,
    /// OAuth token endpoint.
    pub token_url: Url,
    /// Per-request timeout. Zero disables it.
    pub request_timeout: Duration,
    /// Retries after a 429 before giving up.
    pub max_retries: u32,
    /// Base delay for rate limit backoff when no reset header is present.
    pub retry_delay: Duration,
    /// Maximum batch requests in flight at once.
    pub max_concurrent_requests: usize,
}

impl Default for HelixConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse(HELIX_URL).expect("valid default helix url"),
            token_url: Url::parse(TOKEN_URL).expect("valid default token url"),
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            max_concurrent_requests: 4,
        }
    }
}

impl HelixConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }
}

/// Twitch Helix client authenticated with an app access token.
#[derive(Debug)]
pub struct HelixClient {
    client: Client,
    auth: TokenManager,
    config: HelixConfig,
}

impl HelixClient {
    /// Create a client with the default configuration.
    pub fn new(credentials: AppCredentials) -> Result<Self, HelixError> {
        Self::with_config(credentials, HelixConfig::default())
    }

    pub fn with_config(credentials: AppCredentials, config: HelixConfig) -> Result<Self, HelixError> {
        install_rustls_provider();

        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if config.request_timeout > Duration::ZERO {
            builder = builder.timeout(config.request_timeout);
        }
        if config.max_concurrent_requests > 0 {
            builder = builder.pool_max_idle_per_host(config.max_concurrent_requests);
        }
        let client = builder.build()?;

        Ok(Self::with_client(client, credentials, config))
    }

    /// Create a client around an existing `reqwest::Client`.
    ///
    /// The workspace builds reqwest without a bundled TLS provider, so call
    /// [`install_rustls_provider`] before building `client`.
    pub fn with_client(client: Client, credentials: AppCredentials, config: HelixConfig) -> Self {
        install_rustls_provider();
        let auth = TokenManager::new(credentials, config.token_url.clone(), client.clone());
        Self {
            client,
            auth,
            config,
        }
    }

    /// The token manager backing this client.
    pub fn auth(&self) -> &TokenManager {
        &self.auth
    }

    pub fn config(&self) -> &HelixConfig {
        &self.config
    }

    /// Look up users by login. Logins that do not exist are simply absent.
    pub async fn get_users(&self, logins: &[String]) -> Result<Vec<User>, HelixError> {
        self.get_batched("users", "login", logins, &[]).await
    }

    /// Look up live streams by login. Offline channels are absent.
    pub async fn get_streams(&self, logins: &[String]) -> Result<Vec<Stream>, HelixError> {
        // One page holds a full batch when `first` matches the batch size.
        let first = MAX_BATCH_SIZE.to_string();
        self.get_batched("streams", "user_login", logins, &[("first", first.as_str())])
            .await
    }

    async fn get_batched<T: DeserializeOwned + Send>(
        &self,
        endpoint: &str,
        key: &str,
        logins: &[String],
        extra: &[(&str, &str)],
    ) -> Result<Vec<T>, HelixError> {
        if logins.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            endpoint,
            logins = logins.len(),
            batches = batch_count(logins.len(), MAX_BATCH_SIZE),
            "Querying helix"
        );

        let requests: Vec<BoxFuture<'_, Result<Vec<T>, HelixError>>> =
            chunked(logins, MAX_BATCH_SIZE)
                .map(|chunk| {
                    let params: Vec<(String, String)> = chunk
                        .iter()
                        .map(|login| (key.to_string(), login.clone()))
                        .chain(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())))
                        .collect();
                    async move { self.get_json::<T>(endpoint, &params).await }.boxed()
                })
                .collect();

        let batches: Vec<Vec<T>> = stream::iter(requests)
            .buffer_unordered(self.config.max_concurrent_requests.max(1))
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    /// GET a Helix endpoint, refreshing the token once on 401 and backing off on 429.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<Vec<T>, HelixError> {
        let url = self.config.api_base.join(endpoint)?;
        let mut retries = 0;
        let mut refreshed = false;

        loop {
            let token = self.auth.bearer().await?;
            let response = self
                .client
                .get(url.clone())
                .query(params)
                .header("Client-Id", self.auth.credentials().client_id())
                .bearer_auth(&token)
                .send()
                .await?;

            let status = response.status();
            trace!(endpoint, status = status.as_u16(), "Helix response");

            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    return Err(HelixError::Unauthorized);
                }
                self.auth.invalidate(&token).await;
                refreshed = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if retries >= self.config.max_retries {
                    return Err(HelixError::RateLimited { retries });
                }
                let delay = rate_limit_reset_delay(response.headers())
                    .unwrap_or_else(|| self.calculate_backoff(retries));
                warn!(
                    "Rate limited on {}, retrying in {:?} (attempt {}/{})",
                    endpoint,
                    delay,
                    retries + 1,
                    self.config.max_retries
                );
                tokio::time::sleep(delay).await;
                retries += 1;
                continue;
            }

            let body = response.text().await?;
            if !status.is_success() {
                return Err(HelixError::Api {
                    status: status.as_u16(),
                    message: ErrorResponse::describe(&body),
                });
            }

            let parsed: HelixResponse<T> = serde_json::from_str(&body)?;
            return Ok(parsed.data);
        }
    }

    /// Calculate backoff delay with exponential increase and jitter.
    fn calculate_backoff(&self, retry_count: u32) -> Duration {
        let base_delay = self.config.retry_delay.as_millis() as u64;
        let exponential_delay = base_delay.saturating_mul(2u64.saturating_pow(retry_count));

        // Add jitter (+/-25%)
        let jitter_range = exponential_delay / 4;
        let jitter: i64 = if jitter_range > 0 {
            let random_val = rand::random::<u64>() % (jitter_range.saturating_mul(2).max(1));
            random_val as i64 - jitter_range as i64
        } else {
            0
        };

        Duration::from_millis(exponential_delay.saturating_add_signed(jitter))
    }
}

/// Delay until the rate limit bucket refills, from the `Ratelimit-Reset` header.
fn rate_limit_reset_delay(headers: &HeaderMap) -> Option<Duration> {
    let reset = headers
        .get(RATELIMIT_RESET_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()?;
    let wait = (reset - Utc::now().timestamp()).max(0) as u64;
    Some(Duration::from_secs(wait).min(MAX_RATE_LIMIT_WAIT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AccessToken;
    use reqwest::header::HeaderValue;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn client() -> HelixClient {
        install_rustls_provider();
        let config = HelixConfig::default().with_retry_delay(Duration::from_secs(1));
        HelixClient::with_client(
            Client::new(),
            AppCredentials::new("id", "secret").unwrap(),
            config,
        )
    }

    #[test]
    fn test_calculate_backoff() {
        let client = client();

        let delay0 = client.calculate_backoff(0);
        assert!(delay0 >= Duration::from_millis(750));
        assert!(delay0 <= Duration::from_millis(1250));

        let delay1 = client.calculate_backoff(1);
        assert!(delay1 >= Duration::from_millis(1500));
        assert!(delay1 <= Duration::from_millis(2500));
    }

    #[test]
    fn test_rate_limit_reset_delay() {
        let mut headers = HeaderMap::new();
        assert!(rate_limit_reset_delay(&headers).is_none());

        let reset = Utc::now().timestamp() + 5;
        headers.insert(
            RATELIMIT_RESET_HEADER,
            HeaderValue::from_str(&reset.to_string()).unwrap(),
        );
        let delay = rate_limit_reset_delay(&headers).unwrap();
        assert!(delay <= Duration::from_secs(5));
        assert!(delay >= Duration::from_secs(3));

        // Resets in the past mean "now".
        headers.insert(RATELIMIT_RESET_HEADER, HeaderValue::from_static("1"));
        assert_eq!(rate_limit_reset_delay(&headers), Some(Duration::ZERO));

        // Far-future resets are capped.
        let far = Utc::now().timestamp() + 3600;
        headers.insert(
            RATELIMIT_RESET_HEADER,
            HeaderValue::from_str(&far.to_string()).unwrap(),
        );
        assert_eq!(rate_limit_reset_delay(&headers), Some(MAX_RATE_LIMIT_WAIT));
    }

    #[test]
    fn test_default_config_urls() {
        let config = HelixConfig::default();
        assert_eq!(
            config.api_base.join("streams").unwrap().as_str(),
            "https://api.twitch.tv/helix/streams"
        );
        assert_eq!(config.token_url.as_str(), TOKEN_URL);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let client = client();
        assert!(client.get_users(&[]).await.unwrap().is_empty());
        assert!(client.get_streams(&[]).await.unwrap().is_empty());
        // No request means no token was needed.
        assert_eq!(client.auth().state().await.as_str(), "uninitialized");
    }

    /// Answer every request with one user and record each request line.
    async fn serve_users() -> (Url, Arc<Mutex<Vec<String>>>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        let n = socket.read(&mut buf).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        head.extend_from_slice(&buf[..n]);
                    }
                    let request = String::from_utf8_lossy(&head);
                    let line = request.lines().next().unwrap_or_default().to_string();
                    log.lock().unwrap().push(line);

                    let body = r#"{"data":[{"id":"1","login":"someone"}]}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                });
            }
        });

        (base, seen)
    }

    #[tokio::test]
    async fn test_large_lookup_is_split_into_batches() {
        let (base, seen) = serve_users().await;
        let mut config = HelixConfig::default().with_max_concurrent_requests(2);
        config.api_base = base;
        install_rustls_provider();
        let client = HelixClient::with_client(
            Client::new(),
            AppCredentials::new("id", "secret").unwrap(),
            config,
        );
        client.auth().set_token(AccessToken::new("token", None)).await;

        let logins: Vec<String> = (0..250).map(|i| format!("user{i}")).collect();
        let users = client.get_users(&logins).await.unwrap();

        // One user per response, one response per batch.
        assert_eq!(users.len(), 3);
        let seen = seen.lock().unwrap();
        assert!(seen.iter().all(|line| line.starts_with("GET /users?")));
        let mut sizes: Vec<usize> = seen.iter().map(|line| line.matches("login=").count()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![50, 100, 100]);
    }
}
