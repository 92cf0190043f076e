use std::path::{Path, PathBuf};
use std::time::Duration;

use helix_api::{AppCredentials, HelixClient};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use twitch_checker::{ChannelQuery, Login, StateTracker, TrackerSnapshot, TwitchChecker};

use crate::cli::{OutputFormat, StateAction};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::output::{OutputManager, write_output};

/// Command-line overrides that apply to every command.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub state: Option<PathBuf>,
}

pub struct CommandExecutor {
    config: AppConfig,
    overrides: Overrides,
    output: OutputManager,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, overrides: Overrides) -> Self {
        let output = OutputManager::new(config.colored_output);
        Self {
            config,
            overrides,
            output,
        }
    }

    fn format(&self, requested: Option<OutputFormat>) -> OutputFormat {
        requested.unwrap_or(self.config.output_format)
    }

    fn state_path(&self) -> PathBuf {
        self.config.state_path(self.overrides.state.as_deref())
    }

    fn credentials(&self) -> Result<AppCredentials> {
        let client_id = self
            .overrides
            .client_id
            .clone()
            .or_else(|| self.config.client_id.clone())
            .unwrap_or_default();
        let client_secret = self
            .overrides
            .client_secret
            .clone()
            .or_else(|| self.config.client_secret.clone())
            .unwrap_or_default();
        Ok(AppCredentials::new(client_id, client_secret)?)
    }

    fn helix_client(&self) -> Result<HelixClient> {
        Ok(HelixClient::with_config(
            self.credentials()?,
            self.config.helix_config(),
        )?)
    }

    /// Restore the checker from the state file, or start fresh, and merge in the
    /// configured and requested channels.
    fn open_checker<Q: ChannelQuery>(
        &self,
        query: Q,
        path: &Path,
        channels: &[String],
        cooldown: Option<u64>,
    ) -> Result<TwitchChecker<Q>> {
        let mut checker = if path.exists() {
            TwitchChecker::load(path, query)?
        } else {
            debug!(path = %path.display(), "No state file, starting fresh");
            TwitchChecker::new(query, self.config.cooldown_seconds)
        };

        if let Some(cooldown) = cooldown {
            checker.set_cooldown_seconds(cooldown);
        }
        for channel in self.config.channels.iter().chain(channels) {
            if channel.trim().is_empty() {
                continue;
            }
            checker.add_channel(channel)?;
        }
        Ok(checker)
    }

    /// Run one polling cycle and print the result.
    pub async fn check(
        &self,
        channels: &[String],
        cooldown: Option<u64>,
        no_save: bool,
        output: Option<OutputFormat>,
    ) -> Result<()> {
        let path = self.state_path();
        let mut checker = self.open_checker(self.helix_client()?, &path, channels, cooldown)?;

        let statuses = checker.poll().await?;
        write_output(&self.output.format_statuses(&statuses, &self.format(output))?)?;

        if !no_save {
            checker.save(&path)?;
        }
        Ok(())
    }

    /// Poll until Ctrl-C, printing every transition as it happens.
    pub async fn watch(
        &self,
        channels: &[String],
        cooldown: Option<u64>,
        interval: Option<u64>,
        output: Option<OutputFormat>,
    ) -> Result<()> {
        let path = self.state_path();
        let mut checker = self.open_checker(self.helix_client()?, &path, channels, cooldown)?;
        let interval = interval
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or_else(|| self.config.interval());
        let format = self.format(output);

        let token = CancellationToken::new();
        let signal_token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, shutting down");
            }
            signal_token.cancel();
        });

        let mut events = checker.subscribe();
        let printer = self.output;
        let printer_task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match printer.format_event(&event, &format) {
                        Ok(line) => {
                            if let Err(e) = write_output(&line) {
                                error!(error = %e, "Failed to write event");
                            }
                        }
                        Err(e) => error!(error = %e, "Failed to format event"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event printer fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        info!(
            channels = checker.channels().count(),
            interval_secs = interval.as_secs(),
            cooldown_secs = checker.cooldown_seconds(),
            "Watching channels"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                _ = token.cancelled() => break Ok(()),
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = token.cancelled() => break Ok(()),
                result = checker.poll() => result,
            };

            match result {
                Ok(statuses) => {
                    let live = statuses.iter().filter(|s| s.is_live).count();
                    debug!(channels = statuses.len(), live, "Cycle finished");
                    if let Err(e) = checker.save(&path) {
                        warn!(error = %e, path = %path.display(), "Failed to save state");
                    }
                }
                Err(e) => {
                    let e = AppError::from(e);
                    if e.is_fatal() {
                        break Err(e);
                    }
                    warn!(error = %e, "Polling cycle failed, retrying next tick");
                }
            }
        };

        if let Err(e) = checker.save(&path) {
            warn!(error = %e, path = %path.display(), "Failed to save state");
        }
        drop(checker);
        if let Err(e) = printer_task.await {
            error!(error = %e, "Event printer task failed");
        }
        outcome
    }

    pub async fn classify(&self, logins: &[String], output: Option<OutputFormat>) -> Result<()> {
        let checker = TwitchChecker::new(self.helix_client()?, self.config.cooldown_seconds);
        let result = checker.classify(logins).await?;
        write_output(
            &self
                .output
                .format_classification(&result, &self.format(output))?,
        )
    }

    /// Offline edits of the state file. Never contacts Twitch.
    pub fn state(&self, action: StateAction) -> Result<()> {
        let path = self.state_path();
        let mut tracker = if path.exists() {
            StateTracker::from_snapshot(TrackerSnapshot::load(&path)?)?
        } else {
            StateTracker::new(self.config.cooldown_seconds)
        };

        match action {
            StateAction::Show { output } => {
                let snapshot = tracker.snapshot();
                write_output(&self.output.format_snapshot(&snapshot, &self.format(output))?)
            }
            StateAction::Add { channels } => {
                let mut added = 0usize;
                for login in Login::parse_all(&channels)? {
                    if tracker.add_channel(login) {
                        added += 1;
                    }
                }
                tracker.snapshot().save(&path)?;
                println!("Added {added} channel(s), now tracking {}", tracker.len());
                Ok(())
            }
            StateAction::Remove { channels } => {
                let mut removed = 0usize;
                for login in Login::parse_all(&channels)? {
                    if tracker.remove_channel(login.as_str()) {
                        removed += 1;
                    }
                }
                tracker.snapshot().save(&path)?;
                println!("Removed {removed} channel(s), now tracking {}", tracker.len());
                Ok(())
            }
        }
    }
}
