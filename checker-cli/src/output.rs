use std::collections::BTreeMap;
use std::io::Write;

#[cfg(feature = "colored-output")]
use colored::*;
use serde::Serialize;
use twitch_checker::{ChannelEvent, Classification, Login, StreamerStatus, TrackerSnapshot};

use crate::{cli::OutputFormat, error::Result};

#[derive(Debug, Clone, Copy)]
pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_statuses(&self, statuses: &[StreamerStatus], format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_statuses_pretty(statuses)),
            OutputFormat::Json => Self::to_json(&Self::status_values(statuses), true),
            OutputFormat::JsonCompact => Self::to_json(&Self::status_values(statuses), false),
        }
    }

    pub fn format_classification(
        &self,
        result: &BTreeMap<Login, Classification>,
        format: &OutputFormat,
    ) -> Result<String> {
        match format {
            OutputFormat::Pretty => {
                let mut output = String::new();
                for (login, class) in result {
                    let label = match class {
                        Classification::ExistsAndLive => self.colorize("live", &Color::Green, true),
                        Classification::ExistsButNotLive => {
                            self.colorize("offline", &Color::Yellow, false)
                        }
                        Classification::DoesNotExist => {
                            self.colorize("does not exist", &Color::Red, false)
                        }
                    };
                    output.push_str(&format!("{:<25} {}\n", login.as_str(), label));
                }
                Ok(output)
            }
            OutputFormat::Json => Self::to_json(result, true),
            OutputFormat::JsonCompact => Self::to_json(result, false),
        }
    }

    pub fn format_snapshot(&self, snapshot: &TrackerSnapshot, format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => {
                let mut output = String::new();
                output.push_str(&self.colorize(
                    &format!(
                        "{} channel(s), cooldown {}s",
                        snapshot.channels.len(),
                        snapshot.cooldown_seconds
                    ),
                    &Color::Cyan,
                    true,
                ));
                output.push('\n');
                for record in &snapshot.channels {
                    let state = match (record.is_live, record.pending_since) {
                        (true, Some(since)) => self.colorize(
                            &format!("live, missing since {}", since.to_rfc3339()),
                            &Color::Yellow,
                            false,
                        ),
                        (true, None) => self.colorize("live", &Color::Green, false),
                        (false, _) => "offline".to_string(),
                    };
                    output.push_str(&format!("  {:<25} {}\n", record.login.as_str(), state));
                }
                Ok(output)
            }
            OutputFormat::Json => Self::to_json(snapshot, true),
            OutputFormat::JsonCompact => Self::to_json(snapshot, false),
        }
    }

    /// One line per event, suitable for a streaming log.
    pub fn format_event(&self, event: &ChannelEvent, format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => {
                let (marker, color) = match event {
                    ChannelEvent::WentLive { .. } => ("UP  ", Color::Green),
                    ChannelEvent::WentOffline { .. } => ("DOWN", Color::Red),
                };
                let timestamp = match event {
                    ChannelEvent::WentLive { timestamp, .. }
                    | ChannelEvent::WentOffline { timestamp, .. } => *timestamp,
                };
                Ok(format!(
                    "[{}] {} {}\n",
                    timestamp.format("%Y-%m-%d %H:%M:%S"),
                    self.colorize(marker, &color, true),
                    event.description()
                ))
            }
            OutputFormat::Json | OutputFormat::JsonCompact => {
                Ok(format!("{}\n", serde_json::to_string(event)?))
            }
        }
    }

    fn format_statuses_pretty(&self, statuses: &[StreamerStatus]) -> String {
        if statuses.is_empty() {
            return "No channels monitored\n".to_string();
        }

        let mut output = String::new();
        for status in statuses {
            let state = match (status.is_live, &status.stream) {
                (true, Some(_)) => self.colorize("LIVE", &Color::Green, true),
                (true, None) => self.colorize("LIVE?", &Color::Yellow, true),
                (false, _) => "offline".to_string(),
            };
            let change = match status.change {
                Some(change) => self.colorize(change.as_str(), &Color::Cyan, true),
                None => String::new(),
            };
            output.push_str(&format!("{:<25} {:<8} {:<5}", status.login.as_str(), state, change));

            if let Some(stream) = &status.stream {
                if !stream.game_name.is_empty() {
                    output.push_str(&format!(
                        " [{}]",
                        self.colorize(&stream.game_name, &Color::Blue, false)
                    ));
                }
                if !stream.title.is_empty() {
                    output.push_str(&format!(" {}", stream.title));
                }
                output.push_str(&format!(" ({} viewers)", stream.viewer_count));
            }
            output.push('\n');
        }
        output
    }

    fn status_values(statuses: &[StreamerStatus]) -> Vec<serde_json::Value> {
        statuses
            .iter()
            .map(|status| {
                serde_json::json!({
                    "login": status.login,
                    "is_live": status.is_live,
                    "change": status.change,
                    "stream": status.stream,
                })
            })
            .collect()
    }

    fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
        let mut json = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }?;
        json.push('\n');
        Ok(json)
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                    Color::Red => text.red(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
    Red,
}

pub fn write_output(content: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
