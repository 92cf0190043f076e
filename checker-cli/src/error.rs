use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Checker(#[from] twitch_checker::Error),

    #[error("Twitch API error: {0}")]
    Helix(#[from] helix_api::HelixError),

    #[error("Failed to parse config file {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    /// Whether a failed polling cycle should stop `watch` instead of being retried
    /// on the next tick.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::Checker(twitch_checker::Error::Query(e)) | AppError::Helix(e) => {
                e.requires_new_credentials()
            }
            AppError::Checker(_) => false,
            _ => true,
        }
    }
}
