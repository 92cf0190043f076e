//! Existence/liveness query seam.

use std::collections::HashMap;

use async_trait::async_trait;
use helix_api::HelixClient;
use tracing::warn;

use crate::Result;
use crate::domain::Login;
use crate::tracker::RawLiveSet;

/// Looks up which channels exist and which are live.
///
/// Implementations batch internally and retry whatever they consider retryable;
/// any error returned is terminal for the polling cycle.
#[async_trait]
pub trait ChannelQuery: Send + Sync {
    /// Return the subset of `logins` that exist, mapped to their user id.
    async fn validate_exist(&self, logins: &[Login]) -> Result<HashMap<Login, String>>;

    /// Return the subset of `logins` that are live, with raw stream metadata.
    async fn get_live(&self, logins: &[Login]) -> Result<RawLiveSet>;

    /// How many batches may be in flight at once.
    fn max_concurrent_batches(&self) -> usize {
        DEFAULT_CONCURRENT_BATCHES
    }
}

/// Batch concurrency used when an implementation does not specify one.
const DEFAULT_CONCURRENT_BATCHES: usize = 4;

fn to_strings(logins: &[Login]) -> Vec<String> {
    logins.iter().map(|login| login.as_str().to_string()).collect()
}

/// Normalize a login echoed back by the API, dropping anything unparseable.
fn normalize_returned(raw: &str) -> Option<Login> {
    match Login::parse(raw) {
        Ok(login) => Some(login),
        Err(_) => {
            warn!(login = %raw, "Ignoring malformed login in API response");
            None
        }
    }
}

#[async_trait]
impl ChannelQuery for HelixClient {
    async fn validate_exist(&self, logins: &[Login]) -> Result<HashMap<Login, String>> {
        let users = self.get_users(&to_strings(logins)).await?;
        Ok(users
            .into_iter()
            .filter_map(|user| normalize_returned(&user.login).map(|login| (login, user.id)))
            .collect())
    }

    async fn get_live(&self, logins: &[Login]) -> Result<RawLiveSet> {
        let streams = self.get_streams(&to_strings(logins)).await?;
        Ok(streams
            .into_iter()
            .filter_map(|stream| normalize_returned(&stream.user_login).map(|login| (login, stream)))
            .collect())
    }

    fn max_concurrent_batches(&self) -> usize {
        self.config().max_concurrent_requests.max(1)
    }
}

#[async_trait]
impl<Q: ChannelQuery + ?Sized> ChannelQuery for std::sync::Arc<Q> {
    async fn validate_exist(&self, logins: &[Login]) -> Result<HashMap<Login, String>> {
        (**self).validate_exist(logins).await
    }

    async fn get_live(&self, logins: &[Login]) -> Result<RawLiveSet> {
        (**self).get_live(logins).await
    }

    fn max_concurrent_batches(&self) -> usize {
        (**self).max_concurrent_batches()
    }
}
