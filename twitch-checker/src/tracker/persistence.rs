//! Tracker export and import.
//!
//! Pending timers are stored as absolute timestamps so a cooldown that started
//! before a restart keeps counting across it.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChannelState, StateTracker};
use crate::domain::Login;
use crate::utils::fs;
use crate::{Error, Result};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Durable record of a [`StateTracker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub version: u32,
    pub cooldown_seconds: u64,
    pub channels: Vec<ChannelRecord>,
}

/// One channel inside a [`TrackerSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub login: Login,
    pub is_live: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_since: Option<DateTime<Utc>>,
}

impl TrackerSnapshot {
    /// Parse a snapshot from JSON without validating its contents.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::io_path("reading snapshot", path, e))?;
        Self::from_json(&json)
    }

    /// Write the snapshot atomically: readers see either the old or the new file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write_atomic(path, json.as_bytes())?;
        debug!(path = %path.display(), channels = self.channels.len(), "Saved snapshot");
        Ok(())
    }
}

impl StateTracker {
    /// Capture the universe, cooldown and every channel's state.
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            version: SNAPSHOT_VERSION,
            cooldown_seconds: self.cooldown_seconds,
            channels: self
                .channels
                .iter()
                .map(|(login, state)| ChannelRecord {
                    login: login.clone(),
                    is_live: state.is_live(),
                    pending_since: state.pending_since(),
                })
                .collect(),
        }
    }

    /// Rebuild a tracker from a snapshot.
    ///
    /// Fails on an unknown version, duplicate logins, or a pending timer on a
    /// channel that is not live. Nothing is partially loaded.
    pub fn from_snapshot(snapshot: TrackerSnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let mut channels = BTreeMap::new();
        for record in snapshot.channels {
            let state = ChannelState::from_parts(record.is_live, record.pending_since)
                .ok_or_else(|| {
                    Error::corrupt(format!(
                        "channel {} has a pending offline timer but is not live",
                        record.login
                    ))
                })?;

            if channels.insert(record.login.clone(), state).is_some() {
                return Err(Error::corrupt(format!(
                    "channel {} appears more than once",
                    record.login
                )));
            }
        }

        Ok(Self {
            cooldown_seconds: snapshot.cooldown_seconds,
            channels,
        })
    }

    /// Serialize straight to JSON.
    pub fn to_json(&self) -> Result<String> {
        self.snapshot().to_json()
    }

    /// Parse and validate JSON produced by [`StateTracker::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_snapshot(TrackerSnapshot::from_json(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{RawLiveSet, StatusChange};

    fn login(name: &str) -> Login {
        Login::parse(name).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 250_000_000).unwrap()
    }

    fn live_set(tracker_logins: &[&str]) -> RawLiveSet {
        tracker_logins
            .iter()
            .map(|name| {
                let stream: helix_api::Stream = serde_json::from_value(serde_json::json!({
                    "id": "1",
                    "user_id": "2",
                    "user_login": name,
                }))
                .unwrap();
                (login(name), stream)
            })
            .collect()
    }

    #[test]
    fn test_roundtrip_is_lossless() {
        let mut tracker = StateTracker::with_channels(300, [login("a"), login("b"), login("c")]);
        tracker.update_at(&live_set(&["a", "b"]), at(0));
        tracker.update_at(&live_set(&["a"]), at(60));

        let json = tracker.to_json().unwrap();
        let restored = StateTracker::from_json(&json).unwrap();
        assert_eq!(restored, tracker);
        assert_eq!(restored.state("b").unwrap().pending_since(), Some(at(60)));
    }

    #[test]
    fn test_restored_tracker_continues_cooldown() {
        let mut original = StateTracker::with_channels(300, [login("x")]);
        original.update_at(&live_set(&["x"]), at(0));
        original.update_at(&live_set(&[]), at(60));

        let mut restored = StateTracker::from_json(&original.to_json().unwrap()).unwrap();

        for t in [200, 360, 420] {
            let a = original.update_at(&live_set(&[]), at(t));
            let b = restored.update_at(&live_set(&[]), at(t));
            assert_eq!(a, b);
        }
        assert!(!restored.state("x").unwrap().is_live());
    }

    #[test]
    fn test_snapshot_format() {
        let mut tracker = StateTracker::with_channels(120, [login("x"), login("y")]);
        tracker.update_at(&live_set(&["x"]), at(0));
        tracker.update_at(&live_set(&[]), at(10));

        let value = serde_json::to_value(tracker.snapshot()).unwrap();
        assert_eq!(value["version"], SNAPSHOT_VERSION);
        assert_eq!(value["cooldown_seconds"], 120);
        assert_eq!(value["channels"][0]["login"], "x");
        assert_eq!(value["channels"][0]["is_live"], true);
        assert!(value["channels"][0]["pending_since"].is_string());
        assert!(value["channels"][1].get("pending_since").is_none());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let json = r#"{"version": 2, "cooldown_seconds": 0, "channels": []}"#;
        assert!(matches!(
            StateTracker::from_json(json),
            Err(Error::UnsupportedVersion {
                found: 2,
                expected: 1
            })
        ));
    }

    #[test]
    fn test_rejects_corrupt_records() {
        let pending_offline = r#"{"version": 1, "cooldown_seconds": 0, "channels": [
            {"login": "x", "is_live": false, "pending_since": "2024-01-01T00:00:00Z"}
        ]}"#;
        assert!(matches!(
            StateTracker::from_json(pending_offline),
            Err(Error::CorruptSnapshot(_))
        ));

        let duplicate = r#"{"version": 1, "cooldown_seconds": 0, "channels": [
            {"login": "X", "is_live": false},
            {"login": "x", "is_live": true}
        ]}"#;
        assert!(matches!(
            StateTracker::from_json(duplicate),
            Err(Error::CorruptSnapshot(_))
        ));

        let blank_login = r#"{"version": 1, "cooldown_seconds": 0, "channels": [
            {"login": " ", "is_live": false}
        ]}"#;
        assert!(matches!(
            StateTracker::from_json(blank_login),
            Err(Error::Serialization(_))
        ));

        assert!(matches!(
            StateTracker::from_json("{not json"),
            Err(Error::Serialization(_))
        ));
        assert!(matches!(
            StateTracker::from_json(r#"{"version": 1, "channels": []}"#),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut tracker = StateTracker::with_channels(30, [login("x")]);
        let statuses = tracker.update_at(&live_set(&["x"]), at(0));
        assert_eq!(statuses[0].change, Some(StatusChange::Up));

        tracker.snapshot().save(&path).unwrap();
        let loaded = StateTracker::from_snapshot(TrackerSnapshot::load(&path).unwrap()).unwrap();
        assert_eq!(loaded, tracker);

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            TrackerSnapshot::load(&missing),
            Err(Error::IoPath { .. })
        ));
    }
}
