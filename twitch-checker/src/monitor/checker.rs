//! The polling façade.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::classify::{Classification, classify, live_in_batches, validate_in_batches};
use super::events::{ChannelEvent, EventBroadcaster};
use super::query::ChannelQuery;
use crate::Result;
use crate::domain::Login;
use crate::tracker::{StateTracker, StreamerStatus, TrackerSnapshot};

/// Combines the debounced tracker with a [`ChannelQuery`].
///
/// Every login added to the universe is checked for existence once, lazily, at
/// the start of the next [`poll`](Self::poll). Logins that do not exist are
/// dropped and stay dropped until they are added again.
pub struct TwitchChecker<Q> {
    query: Q,
    tracker: StateTracker,
    verified: HashSet<Login>,
    user_ids: HashMap<Login, String>,
    events: EventBroadcaster,
}

/// Outcome of the existence check, computed before anything is committed.
struct Validation {
    checked: Vec<Login>,
    existing: HashMap<Login, String>,
}

impl Validation {
    fn missing(&self) -> impl Iterator<Item = &Login> {
        self.checked
            .iter()
            .filter(|login| !self.existing.contains_key(*login))
    }
}

impl<Q: ChannelQuery> TwitchChecker<Q> {
    pub fn new(query: Q, cooldown_seconds: u64) -> Self {
        Self::from_tracker(query, StateTracker::new(cooldown_seconds))
    }

    /// Create a checker monitoring `logins`. Blank entries are skipped.
    pub fn with_channels<I, S>(query: Q, cooldown_seconds: u64, logins: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let logins = Login::parse_all(logins)?;
        Ok(Self::from_tracker(
            query,
            StateTracker::with_channels(cooldown_seconds, logins),
        ))
    }

    fn from_tracker(query: Q, tracker: StateTracker) -> Self {
        Self {
            query,
            tracker,
            verified: HashSet::new(),
            user_ids: HashMap::new(),
            events: EventBroadcaster::new(),
        }
    }

    /// Rebuild a checker from a snapshot. Restored channels are re-validated on
    /// the first poll.
    pub fn from_snapshot(snapshot: TrackerSnapshot, query: Q) -> Result<Self> {
        Ok(Self::from_tracker(query, StateTracker::from_snapshot(snapshot)?))
    }

    /// Load a snapshot file written by [`save`](Self::save).
    pub fn load(path: &Path, query: Q) -> Result<Self> {
        let snapshot = TrackerSnapshot::load(path)?;
        info!(path = %path.display(), channels = snapshot.channels.len(), "Loaded checker state");
        Self::from_snapshot(snapshot, query)
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.tracker.snapshot()
    }

    /// Atomically write the current snapshot to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.snapshot().save(path)
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.tracker.cooldown_seconds()
    }

    pub fn set_cooldown_seconds(&mut self, cooldown_seconds: u64) {
        self.tracker.set_cooldown_seconds(cooldown_seconds);
    }

    /// Monitored logins in sorted order.
    pub fn channels(&self) -> impl Iterator<Item = &Login> {
        self.tracker.channels()
    }

    /// Add `raw` to the monitoring universe. Returns `false` if already monitored.
    pub fn add_channel(&mut self, raw: &str) -> Result<bool> {
        let login = Login::parse(raw)?;
        Ok(self.tracker.add_channel(login))
    }

    /// Remove `raw` from the monitoring universe, forgetting its history.
    pub fn remove_channel(&mut self, raw: &str) -> bool {
        let Ok(login) = Login::parse(raw) else {
            return false;
        };
        self.verified.remove(&login);
        self.user_ids.remove(&login);
        self.tracker.remove_channel(login.as_str())
    }

    /// Replace the monitoring universe. Returns whether it changed.
    pub fn set_channels<I, S>(&mut self, logins: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let logins = Login::parse_all(logins)?;
        let changed = self.tracker.set_channels(logins);
        let tracker = &self.tracker;
        self.verified.retain(|login| tracker.contains(login.as_str()));
        self.user_ids.retain(|login, _| tracker.contains(login.as_str()));
        Ok(changed)
    }

    /// Whether `login` passed the existence check.
    pub fn is_verified(&self, login: &str) -> bool {
        self.verified.contains(login)
    }

    /// Cached user id for `login`, filled by existence checks.
    pub fn user_id(&self, login: &str) -> Option<&str> {
        self.user_ids.get(login).map(String::as_str)
    }

    /// Resolve the user id for any login, asking the query layer on a cache miss.
    ///
    /// Only monitored logins are cached.
    pub async fn lookup_user_id(&mut self, raw: &str) -> Result<Option<String>> {
        let login = Login::parse(raw)?;
        if let Some(id) = self.user_ids.get(&login) {
            return Ok(Some(id.clone()));
        }

        let found = self
            .query
            .validate_exist(std::slice::from_ref(&login))
            .await?;
        let id = found.get(&login).cloned();
        if let Some(id) = &id
            && self.tracker.contains(login.as_str())
        {
            self.verified.insert(login.clone());
            self.user_ids.insert(login, id.clone());
        }
        Ok(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Check every not-yet-validated login and drop those that do not exist.
    ///
    /// Returns the dropped logins. On error nothing changes.
    pub async fn validate_channels(&mut self) -> Result<Vec<Login>> {
        let validation = self.validate_pending().await?;
        Ok(self.commit_validation(validation))
    }

    /// Classify arbitrary logins without touching the monitoring universe.
    pub async fn classify<I, S>(&self, logins: I) -> Result<BTreeMap<Login, Classification>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let logins = Login::parse_all(logins)?;
        classify(&self.query, &logins).await
    }

    /// Run one polling cycle.
    ///
    /// Pending logins are validated, the surviving universe is queried for
    /// liveness and the result is folded into the tracker. Either collaborator
    /// call failing fails the cycle with no state changed.
    pub async fn poll(&mut self) -> Result<Vec<StreamerStatus>> {
        self.run_cycle(None).await
    }

    /// Like [`poll`](Self::poll), but observes the result at `now`.
    pub async fn poll_at(&mut self, now: DateTime<Utc>) -> Result<Vec<StreamerStatus>> {
        self.run_cycle(Some(now)).await
    }

    async fn run_cycle(&mut self, now: Option<DateTime<Utc>>) -> Result<Vec<StreamerStatus>> {
        let validation = self.validate_pending().await?;
        let missing: HashSet<&Login> = validation.missing().collect();
        let to_query: Vec<Login> = self
            .tracker
            .channels()
            .filter(|login| !missing.contains(*login))
            .cloned()
            .collect();

        let raw_live = live_in_batches(&self.query, &to_query).await?;
        let now = now.unwrap_or_else(Utc::now);

        self.commit_validation(validation);
        let statuses = self.tracker.update_at(&raw_live, now);

        let mut changes = 0usize;
        for event in statuses
            .iter()
            .filter_map(|status| ChannelEvent::from_status(status, now))
        {
            changes += 1;
            self.events.publish(event);
        }

        debug!(
            channels = statuses.len(),
            live = raw_live.len(),
            changes,
            "Polling cycle complete"
        );
        Ok(statuses)
    }

    async fn validate_pending(&self) -> Result<Validation> {
        let checked: Vec<Login> = self
            .tracker
            .channels()
            .filter(|login| !self.verified.contains(*login))
            .cloned()
            .collect();

        let existing = if checked.is_empty() {
            HashMap::new()
        } else {
            validate_in_batches(&self.query, &checked).await?
        };
        Ok(Validation { checked, existing })
    }

    fn commit_validation(&mut self, validation: Validation) -> Vec<Login> {
        let dropped: Vec<Login> = validation.missing().cloned().collect();
        for login in &dropped {
            warn!(login = %login, "Channel does not exist, no longer monitoring it");
            self.tracker.remove_channel(login.as_str());
        }

        let Validation { checked, mut existing } = validation;
        for login in checked {
            if let Some(id) = existing.remove(&login) {
                self.user_ids.insert(login.clone(), id);
                self.verified.insert(login);
            }
        }
        dropped
    }
}

impl<Q> std::fmt::Debug for TwitchChecker<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitchChecker")
            .field("tracker", &self.tracker)
            .field("verified", &self.verified.len())
            .field("events", &self.events)
            .finish()
    }
}
