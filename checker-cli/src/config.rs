use std::path::{Path, PathBuf};
use std::time::Duration;

use helix_api::HelixConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::OutputFormat;
use crate::error::{AppError, Result};

const APP_DIR: &str = "twitch-checker";
const CONFIG_FILE: &str = "config.toml";
const STATE_FILE: &str = "state.json";
const REDACTED: &str = "********";

/// Settings read from `config.toml`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Seconds a live channel may be missing before it is reported offline.
    pub cooldown_seconds: u64,
    /// Seconds between polling cycles in `watch`.
    pub interval_seconds: u64,
    /// Channels that are always monitored.
    pub channels: Vec<String>,
    /// Where `check`, `watch` and `state` keep the tracker state.
    pub state_file: Option<PathBuf>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub output_format: OutputFormat,
    pub colored_output: bool,
    pub helix: HelixSettings,
}

/// Tuning for the Helix client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelixSettings {
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_concurrent_requests: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 300,
            interval_seconds: 60,
            channels: Vec::new(),
            state_file: None,
            client_id: None,
            client_secret: None,
            output_format: OutputFormat::Pretty,
            colored_output: true,
            helix: HelixSettings::default(),
        }
    }
}

impl Default for HelixSettings {
    fn default() -> Self {
        let defaults = HelixConfig::default();
        Self {
            request_timeout_secs: defaults.request_timeout.as_secs(),
            max_retries: defaults.max_retries,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
            max_concurrent_requests: defaults.max_concurrent_requests,
        }
    }
}

impl AppConfig {
    /// Default config location, `<config_dir>/twitch-checker/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Default state location, `<data_dir>/twitch-checker/state.json`.
    pub fn default_state_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(STATE_FILE)
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist. A missing file at the default location yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if required {
                return Err(AppError::ConfigNotFound(path));
            }
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::parse(&content).map_err(|source| AppError::ConfigParse {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overwrite the config file with the defaults.
    pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path().ok_or_else(|| {
                AppError::InvalidInput("no config directory on this platform".to_string())
            })?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(&Self::default())?)?;
        Ok(path)
    }

    /// Render the configuration as TOML with secrets masked.
    pub fn show(&self) -> Result<String> {
        let mut redacted = self.clone();
        if redacted.client_secret.is_some() {
            redacted.client_secret = Some(REDACTED.to_string());
        }
        Ok(toml::to_string_pretty(&redacted)?)
    }

    /// Resolve the state file: explicit flag, then config, then the default.
    pub fn state_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.state_file.clone())
            .unwrap_or_else(Self::default_state_path)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }

    pub fn helix_config(&self) -> HelixConfig {
        HelixConfig::default()
            .with_request_timeout(Duration::from_secs(self.helix.request_timeout_secs))
            .with_max_retries(self.helix.max_retries)
            .with_retry_delay(Duration::from_millis(self.helix.retry_delay_ms))
            .with_max_concurrent_requests(self.helix.max_concurrent_requests)
    }
}
