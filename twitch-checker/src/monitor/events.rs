//! Channel transition events.
//!
//! Every `UP`/`DOWN` produced by a successful poll is published here for
//! downstream consumers (notifiers, recorders).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::Login;
use crate::tracker::{StatusChange, StreamerStatus};

/// Events emitted by the checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// Channel went live.
    WentLive {
        login: Login,
        title: Option<String>,
        category: Option<String>,
        started_at: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    },
    /// Channel stayed absent through the cooldown window.
    WentOffline {
        login: Login,
        timestamp: DateTime<Utc>,
    },
}

impl ChannelEvent {
    /// Build the event for a status that carries a transition.
    pub fn from_status(status: &StreamerStatus, timestamp: DateTime<Utc>) -> Option<Self> {
        match status.change? {
            StatusChange::Up => {
                let stream = status.stream.as_ref();
                Some(Self::WentLive {
                    login: status.login.clone(),
                    title: stream
                        .map(|s| s.title.clone())
                        .filter(|t| !t.is_empty()),
                    category: stream
                        .map(|s| s.game_name.clone())
                        .filter(|c| !c.is_empty()),
                    started_at: stream.and_then(|s| s.started_at),
                    timestamp,
                })
            }
            StatusChange::Down => Some(Self::WentOffline {
                login: status.login.clone(),
                timestamp,
            }),
        }
    }

    pub fn login(&self) -> &Login {
        match self {
            Self::WentLive { login, .. } | Self::WentOffline { login, .. } => login,
        }
    }

    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self {
            ChannelEvent::WentLive {
                login,
                title: Some(title),
                ..
            } => format!("{} is now live: {}", login, title),
            ChannelEvent::WentLive { login, .. } => format!("{} is now live", login),
            ChannelEvent::WentOffline { login, .. } => format!("{} went offline", login),
        }
    }
}

/// Broadcaster for channel events.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<ChannelEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of receivers that got it.
    pub fn publish(&self, event: ChannelEvent) -> usize {
        // No subscribers is not an error for a fire-and-forget feed.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
