//! Minimal Twitch Helix client.
//!
//! Provides the two lookups a live-status checker needs, existence (`/users`) and
//! liveness (`/streams`), with:
//! - app access token management ([`TokenManager`])
//! - batching into requests of at most [`MAX_BATCH_SIZE`] logins
//! - transparent token refresh on 401 and backoff on 429

pub mod batch;
pub mod client;
pub mod credentials;
pub mod error;
pub mod models;

pub use batch::{MAX_BATCH_SIZE, chunked};
pub use client::{HELIX_URL, HelixClient, HelixConfig, TOKEN_URL};
pub use credentials::{AccessToken, AppCredentials, TokenManager, TokenState};
pub use error::HelixError;
pub use models::{Stream, User};
