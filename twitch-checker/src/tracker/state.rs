//! Per-channel state and the debounced transition rule.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use helix_api::Stream;
use serde::{Deserialize, Serialize};

use crate::domain::Login;

/// A reported change in public status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusChange {
    /// The channel started broadcasting.
    Up,
    /// The channel stayed absent for the whole cooldown window.
    Down,
}

impl StatusChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }
}

impl fmt::Display for StatusChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracked state of one monitored channel.
///
/// `pending_since` is only ever set while `is_live` is true: an offline channel
/// cannot be waiting to go offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelState {
    is_live: bool,
    pending_since: Option<DateTime<Utc>>,
}

impl ChannelState {
    /// Rebuild a state from stored parts. Returns `None` if the parts violate the
    /// pending-only-while-live invariant.
    pub fn from_parts(is_live: bool, pending_since: Option<DateTime<Utc>>) -> Option<Self> {
        if pending_since.is_some() && !is_live {
            return None;
        }
        Some(Self {
            is_live,
            pending_since,
        })
    }

    /// Last reported (post-debounce) live flag.
    pub fn is_live(&self) -> bool {
        self.is_live
    }

    /// When the channel was first seen missing while still reported live.
    pub fn pending_since(&self) -> Option<DateTime<Utc>> {
        self.pending_since
    }

    /// Whether an offline debounce window is running.
    pub fn is_pending_offline(&self) -> bool {
        self.pending_since.is_some()
    }

    /// Fold one raw observation into the state.
    pub(crate) fn observe(
        &mut self,
        raw_live: bool,
        now: DateTime<Utc>,
        cooldown: TimeDelta,
    ) -> Option<StatusChange> {
        if raw_live {
            // Reappearing inside the window counts as never having left.
            self.pending_since = None;
            if self.is_live {
                return None;
            }
            self.is_live = true;
            return Some(StatusChange::Up);
        }

        if !self.is_live {
            return None;
        }

        let since = *self.pending_since.get_or_insert(now);
        if now - since >= cooldown {
            self.is_live = false;
            self.pending_since = None;
            return Some(StatusChange::Down);
        }

        None
    }
}

/// Status of one channel after a polling cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamerStatus {
    pub login: Login,
    /// Post-debounce live flag.
    pub is_live: bool,
    pub change: Option<StatusChange>,
    /// Raw stream metadata, present only when the channel was in the raw live set.
    pub stream: Option<Stream>,
}

impl StreamerStatus {
    pub fn has_changed(&self) -> bool {
        self.change.is_some()
    }
}

impl fmt::Display for StreamerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_live { "LIVE" } else { "offline" };
        write!(f, "{} is {}", self.login, status)?;
        if let Some(change) = self.change {
            write!(f, ", change={}", change)?;
        }
        Ok(())
    }
}
