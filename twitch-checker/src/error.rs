//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The query collaborator failed; the polling cycle did not happen.
    #[error("Query error: {0}")]
    Query(#[from] helix_api::HelixError),

    #[error("Invalid login: {0:?}")]
    InvalidLogin(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("IO error while {op} {}: {source}", .path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn invalid_login(raw: impl Into<String>) -> Self {
        Self::InvalidLogin(raw.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptSnapshot(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Check if the error came from the query collaborator.
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }

    /// Check if retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Query(e) => e.is_transient(),
            _ => false,
        }
    }
}
