//! Debounced change detection.
//!
//! The [`StateTracker`] owns one [`ChannelState`] per monitored login and folds a
//! raw live set into it once per polling cycle:
//! - a channel seen live after being reported offline fires `UP`
//! - a reported-live channel that goes missing starts a cooldown window
//! - `DOWN` fires only once the channel stayed missing for the whole window
//!
//! The tracker does no I/O and cannot fail.

mod persistence;
mod state;

pub use persistence::{ChannelRecord, SNAPSHOT_VERSION, TrackerSnapshot};
pub use state::{ChannelState, StatusChange, StreamerStatus};

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use helix_api::Stream;
use tracing::{debug, info};

use crate::domain::Login;

/// Channels reported live in one cycle, with their raw stream metadata.
pub type RawLiveSet = HashMap<Login, Stream>;

/// Owns the monitoring universe and each channel's debounce state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTracker {
    cooldown_seconds: u64,
    channels: BTreeMap<Login, ChannelState>,
}

impl StateTracker {
    /// Create an empty tracker.
    pub fn new(cooldown_seconds: u64) -> Self {
        Self {
            cooldown_seconds,
            channels: BTreeMap::new(),
        }
    }

    /// Create a tracker monitoring `logins`, all starting offline.
    pub fn with_channels(cooldown_seconds: u64, logins: impl IntoIterator<Item = Login>) -> Self {
        let mut tracker = Self::new(cooldown_seconds);
        for login in logins {
            tracker.add_channel(login);
        }
        tracker
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.cooldown_seconds
    }

    /// Change the cooldown. Running windows are measured against the new value on
    /// the next update.
    pub fn set_cooldown_seconds(&mut self, cooldown_seconds: u64) {
        self.cooldown_seconds = cooldown_seconds;
    }

    fn cooldown(&self) -> TimeDelta {
        i64::try_from(self.cooldown_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// Start monitoring `login`. Returns `false` if it was already monitored.
    pub fn add_channel(&mut self, login: Login) -> bool {
        if self.channels.contains_key(&login) {
            return false;
        }
        debug!(login = %login, "Monitoring channel");
        self.channels.insert(login, ChannelState::default());
        true
    }

    /// Stop monitoring `login`, discarding its state. Returns `false` if it was not
    /// monitored.
    pub fn remove_channel(&mut self, login: &str) -> bool {
        let removed = self.channels.remove(login).is_some();
        if removed {
            debug!(login = %login, "Stopped monitoring channel");
        }
        removed
    }

    /// Replace the monitoring universe with `logins`.
    ///
    /// Channels present before and after keep their state. Returns whether the
    /// universe changed.
    pub fn set_channels(&mut self, logins: impl IntoIterator<Item = Login>) -> bool {
        let mut next: BTreeMap<Login, ChannelState> = BTreeMap::new();
        for login in logins {
            let state = self.channels.get(&login).copied().unwrap_or_default();
            next.insert(login, state);
        }

        let changed = next.len() != self.channels.len()
            || next.keys().any(|login| !self.channels.contains_key(login));
        self.channels = next;
        changed
    }

    pub fn contains(&self, login: &str) -> bool {
        self.channels.contains_key(login)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Monitored logins in sorted order.
    pub fn channels(&self) -> impl Iterator<Item = &Login> {
        self.channels.keys()
    }

    pub fn state(&self, login: &str) -> Option<&ChannelState> {
        self.channels.get(login)
    }

    /// Channels currently reported live.
    pub fn live_channels(&self) -> impl Iterator<Item = &Login> {
        self.channels
            .iter()
            .filter(|(_, state)| state.is_live())
            .map(|(login, _)| login)
    }

    /// Fold `raw_live` into the tracked state using the current time.
    pub fn update(&mut self, raw_live: &RawLiveSet) -> Vec<StreamerStatus> {
        self.update_at(raw_live, Utc::now())
    }

    /// Fold `raw_live`, observed at `now`, into the tracked state.
    ///
    /// Returns one status per monitored channel, ordered by login. Entries of
    /// `raw_live` that are not monitored are ignored.
    pub fn update_at(&mut self, raw_live: &RawLiveSet, now: DateTime<Utc>) -> Vec<StreamerStatus> {
        let cooldown = self.cooldown();
        let mut statuses = Vec::with_capacity(self.channels.len());

        for (login, state) in self.channels.iter_mut() {
            let stream = raw_live.get(login);
            let change = state.observe(stream.is_some(), now, cooldown);

            match change {
                Some(StatusChange::Up) => info!(login = %login, "Channel went live"),
                Some(StatusChange::Down) => info!(login = %login, "Channel went offline"),
                None if state.is_pending_offline() && stream.is_none() => {
                    debug!(
                        login = %login,
                        pending_since = ?state.pending_since(),
                        "Channel missing, waiting for cooldown"
                    );
                }
                None => {}
            }

            statuses.push(StreamerStatus {
                login: login.clone(),
                is_live: state.is_live(),
                change,
                stream: stream.cloned(),
            });
        }

        let ignored = raw_live
            .keys()
            .filter(|login| !self.channels.contains_key(*login))
            .count();
        if ignored > 0 {
            debug!(ignored, "Ignored live channels outside the monitoring universe");
        }

        statuses
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new(0)
    }
}
