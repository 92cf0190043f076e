//! Existence and liveness classification for arbitrary login sets.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use futures::stream::{self, StreamExt, TryStreamExt};
use helix_api::{MAX_BATCH_SIZE, chunked};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::query::ChannelQuery;
use crate::Result;
use crate::domain::Login;
use crate::tracker::RawLiveSet;

/// Where a login stands right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    DoesNotExist,
    ExistsButNotLive,
    ExistsAndLive,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoesNotExist => "does_not_exist",
            Self::ExistsButNotLive => "exists_but_not_live",
            Self::ExistsAndLive => "exists_and_live",
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, Self::DoesNotExist)
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::ExistsAndLive)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate existence of `logins` in batches of at most [`MAX_BATCH_SIZE`],
/// keeping at most [`ChannelQuery::max_concurrent_batches`] in flight.
pub async fn validate_in_batches<Q: ChannelQuery + ?Sized>(
    query: &Q,
    logins: &[Login],
) -> Result<HashMap<Login, String>> {
    let requests: Vec<_> = chunked(logins, MAX_BATCH_SIZE)
        .map(|chunk| query.validate_exist(chunk))
        .collect();
    let batches: Vec<HashMap<Login, String>> = stream::iter(requests)
        .buffer_unordered(query.max_concurrent_batches().max(1))
        .try_collect()
        .await?;
    Ok(batches.into_iter().flatten().collect())
}

/// Query liveness of `logins` in batches of at most [`MAX_BATCH_SIZE`],
/// keeping at most [`ChannelQuery::max_concurrent_batches`] in flight.
pub async fn live_in_batches<Q: ChannelQuery + ?Sized>(
    query: &Q,
    logins: &[Login],
) -> Result<RawLiveSet> {
    let requests: Vec<_> = chunked(logins, MAX_BATCH_SIZE)
        .map(|chunk| query.get_live(chunk))
        .collect();
    let batches: Vec<RawLiveSet> = stream::iter(requests)
        .buffer_unordered(query.max_concurrent_batches().max(1))
        .try_collect()
        .await?;
    Ok(batches.into_iter().flatten().collect())
}

/// Classify every distinct login in `logins`.
///
/// Existence is checked first and only existing logins are queried for liveness,
/// so a login that fails validation is always [`Classification::DoesNotExist`].
/// The result has exactly one entry per distinct input login.
pub async fn classify<Q: ChannelQuery + ?Sized>(
    query: &Q,
    logins: &[Login],
) -> Result<BTreeMap<Login, Classification>> {
    let unique: Vec<Login> = logins
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let existing = validate_in_batches(query, &unique).await?;
    let to_query: Vec<Login> = unique
        .iter()
        .filter(|login| existing.contains_key(*login))
        .cloned()
        .collect();
    let live = live_in_batches(query, &to_query).await?;

    let result: BTreeMap<Login, Classification> = unique
        .into_iter()
        .map(|login| {
            let class = if !existing.contains_key(&login) {
                Classification::DoesNotExist
            } else if live.contains_key(&login) {
                Classification::ExistsAndLive
            } else {
                Classification::ExistsButNotLive
            };
            (login, class)
        })
        .collect();

    debug!(
        total = result.len(),
        existing = to_query.len(),
        live = result.values().filter(|c| c.is_live()).count(),
        "Classified logins"
    );

    Ok(result)
}
