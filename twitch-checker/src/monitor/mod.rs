//! Polling on top of the tracker.
//!
//! - [`ChannelQuery`]: the existence/liveness seam, implemented for
//!   [`helix_api::HelixClient`]
//! - [`classify`]: batched existence + liveness classification
//! - [`TwitchChecker`]: validation bookkeeping, polling cycles and events

mod checker;
mod classify;
mod events;
mod query;

pub use checker::TwitchChecker;
pub use classify::{Classification, classify, live_in_batches, validate_in_batches};
pub use events::{ChannelEvent, EventBroadcaster};
pub use query::ChannelQuery;
