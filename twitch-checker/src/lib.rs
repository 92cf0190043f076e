//! Debounced live-status tracking for Twitch channels.
//!
//! [`StateTracker`] turns repeated "who is live right now" snapshots into `UP` /
//! `DOWN` transitions, holding a channel live through short gaps in the API's
//! view of it. [`TwitchChecker`] drives the tracker from a [`ChannelQuery`]
//! (normally a [`helix_api::HelixClient`]), validates channel existence and
//! persists its state between runs.

pub mod domain;
pub mod error;
pub mod monitor;
pub mod tracker;
pub mod utils;

pub use domain::Login;
pub use error::{Error, Result};
pub use monitor::{ChannelEvent, ChannelQuery, Classification, EventBroadcaster, TwitchChecker};
pub use tracker::{
    ChannelRecord, ChannelState, RawLiveSet, SNAPSHOT_VERSION, StateTracker, StatusChange,
    StreamerStatus, TrackerSnapshot,
};
