//! End-to-end polling behavior against an in-memory query.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use helix_api::{HelixError, MAX_BATCH_SIZE, Stream};
use twitch_checker::{
    ChannelEvent, ChannelQuery, Classification, Error, Login, RawLiveSet, Result, StatusChange,
    TwitchChecker,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Validate(usize),
    Live(usize),
}

/// Scripted query: fixed existing set, mutable live set, switchable failures.
#[derive(Default)]
struct FakeQuery {
    existing: Mutex<HashSet<String>>,
    live: Mutex<HashSet<String>>,
    fail_validate: Mutex<bool>,
    fail_live: Mutex<bool>,
    calls: Mutex<Vec<Call>>,
}

impl FakeQuery {
    fn new(existing: &[&str]) -> Arc<Self> {
        let query = Self::default();
        query
            .existing
            .lock()
            .unwrap()
            .extend(existing.iter().map(|s| s.to_string()));
        Arc::new(query)
    }

    fn set_live(&self, logins: &[&str]) {
        *self.live.lock().unwrap() = logins.iter().map(|s| s.to_string()).collect();
    }

    fn fail_live(&self, fail: bool) {
        *self.fail_live.lock().unwrap() = fail;
    }

    fn fail_validate(&self, fail: bool) {
        *self.fail_validate.lock().unwrap() = fail;
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

fn stream_for(login: &Login) -> Stream {
    serde_json::from_value(serde_json::json!({
        "id": format!("stream-{login}"),
        "user_id": format!("id-{login}"),
        "user_login": login.as_str(),
        "title": format!("{login} playing"),
        "game_name": "Just Chatting",
        "started_at": "2024-05-01T12:00:00Z",
    }))
    .unwrap()
}

#[async_trait]
impl ChannelQuery for FakeQuery {
    async fn validate_exist(&self, logins: &[Login]) -> Result<HashMap<Login, String>> {
        self.calls.lock().unwrap().push(Call::Validate(logins.len()));
        if *self.fail_validate.lock().unwrap() {
            return Err(Error::Query(HelixError::RateLimited { retries: 3 }));
        }
        let existing = self.existing.lock().unwrap();
        Ok(logins
            .iter()
            .filter(|login| existing.contains(login.as_str()))
            .map(|login| (login.clone(), format!("id-{login}")))
            .collect())
    }

    async fn get_live(&self, logins: &[Login]) -> Result<RawLiveSet> {
        self.calls.lock().unwrap().push(Call::Live(logins.len()));
        if *self.fail_live.lock().unwrap() {
            return Err(Error::Query(HelixError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            }));
        }
        let live = self.live.lock().unwrap();
        Ok(logins
            .iter()
            .filter(|login| live.contains(login.as_str()))
            .map(|login| (login.clone(), stream_for(login)))
            .collect())
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

fn changes(statuses: &[twitch_checker::StreamerStatus]) -> Vec<(&str, Option<StatusChange>)> {
    statuses
        .iter()
        .map(|s| (s.login.as_str(), s.change))
        .collect()
}

#[tokio::test]
async fn test_worked_example_through_checker() {
    let query = FakeQuery::new(&["shroud"]);
    let mut checker = TwitchChecker::with_channels(query.clone(), 300, ["shroud"]).unwrap();

    query.set_live(&["shroud"]);
    let statuses = checker.poll_at(at(0)).await.unwrap();
    assert_eq!(changes(&statuses), vec![("shroud", Some(StatusChange::Up))]);
    assert!(statuses[0].stream.is_some());

    query.set_live(&[]);
    let statuses = checker.poll_at(at(60)).await.unwrap();
    assert_eq!(changes(&statuses), vec![("shroud", None)]);
    assert!(statuses[0].is_live);
    assert!(statuses[0].stream.is_none());

    let statuses = checker.poll_at(at(360)).await.unwrap();
    assert_eq!(changes(&statuses), vec![("shroud", Some(StatusChange::Down))]);
    assert!(!statuses[0].is_live);
}

#[tokio::test]
async fn test_flap_is_suppressed() {
    let query = FakeQuery::new(&["a"]);
    let mut checker = TwitchChecker::with_channels(query.clone(), 300, ["a"]).unwrap();

    let mut seen = Vec::new();
    for (secs, live) in [(0, true), (60, false), (120, true)] {
        let set: &[&str] = if live { &["a"] } else { &[] };
        query.set_live(set);
        let statuses = checker.poll_at(at(secs)).await.unwrap();
        seen.push(statuses[0].change);
    }
    assert_eq!(seen, vec![Some(StatusChange::Up), None, None]);
    assert!(!checker.tracker().state("a").unwrap().is_pending_offline());
}

#[tokio::test]
async fn test_failed_liveness_query_leaves_state_untouched() {
    let query = FakeQuery::new(&["a", "b"]);
    let mut checker = TwitchChecker::with_channels(query.clone(), 0, ["a", "b", "ghost"]).unwrap();
    let before = checker.snapshot();

    query.fail_live(true);
    query.set_live(&["a"]);
    let err = checker.poll_at(at(0)).await.unwrap_err();
    assert!(err.is_query());
    assert!(err.is_transient());

    // Validation succeeded but must not have been committed.
    assert_eq!(checker.snapshot(), before);
    assert!(checker.tracker().contains("ghost"));
    assert!(!checker.is_verified("a"));
    assert_eq!(checker.user_id("a"), None);

    query.fail_live(false);
    let statuses = checker.poll_at(at(10)).await.unwrap();
    assert_eq!(
        changes(&statuses),
        vec![("a", Some(StatusChange::Up)), ("b", None)]
    );
    assert!(!checker.tracker().contains("ghost"));
}

#[tokio::test]
async fn test_failed_validation_skips_liveness_query() {
    let query = FakeQuery::new(&["a"]);
    let mut checker = TwitchChecker::with_channels(query.clone(), 0, ["a"]).unwrap();

    query.fail_validate(true);
    assert!(checker.poll_at(at(0)).await.is_err());
    assert_eq!(query.calls(), vec![Call::Validate(1)]);
    assert!(checker.validate_channels().await.is_err());
    assert!(checker.tracker().contains("a"));
}

#[tokio::test]
async fn test_validation_happens_once_per_login() {
    let query = FakeQuery::new(&["a", "b"]);
    let mut checker = TwitchChecker::with_channels(query.clone(), 0, ["a"]).unwrap();

    checker.poll_at(at(0)).await.unwrap();
    checker.poll_at(at(10)).await.unwrap();
    assert_eq!(
        query.calls(),
        vec![Call::Validate(1), Call::Live(1), Call::Live(1)]
    );

    query.clear_calls();
    checker.add_channel("B").unwrap();
    checker.poll_at(at(20)).await.unwrap();
    assert_eq!(query.calls(), vec![Call::Validate(1), Call::Live(2)]);
}

#[tokio::test]
async fn test_nonexistent_login_dropped_until_readded() {
    let query = FakeQuery::new(&["real"]);
    let mut checker = TwitchChecker::with_channels(query.clone(), 0, ["real", "ghost"]).unwrap();

    let dropped = checker.validate_channels().await.unwrap();
    assert_eq!(dropped, vec![Login::parse("ghost").unwrap()]);
    assert_eq!(checker.channels().count(), 1);

    // The account is created later; re-adding validates it again.
    query.existing.lock().unwrap().insert("ghost".to_string());
    assert!(checker.add_channel("ghost").unwrap());
    assert!(checker.validate_channels().await.unwrap().is_empty());
    assert_eq!(checker.user_id("ghost"), Some("id-ghost"));
}

#[tokio::test]
async fn test_large_universe_is_batched() {
    let logins: Vec<String> = (0..250).map(|i| format!("user{i:03}")).collect();
    let names: Vec<&str> = logins.iter().map(String::as_str).collect();
    let query = FakeQuery::new(&names[..200]);
    query.set_live(&names[..150]);

    let mut checker = TwitchChecker::with_channels(query.clone(), 0, &logins).unwrap();
    let statuses = checker.poll_at(at(0)).await.unwrap();

    assert_eq!(statuses.len(), 200);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| s.change == Some(StatusChange::Up))
            .count(),
        150
    );

    let calls = query.calls();
    let mut validate: Vec<usize> = calls
        .iter()
        .filter_map(|c| match c {
            Call::Validate(n) => Some(*n),
            Call::Live(_) => None,
        })
        .collect();
    let mut live: Vec<usize> = calls
        .iter()
        .filter_map(|c| match c {
            Call::Live(n) => Some(*n),
            Call::Validate(_) => None,
        })
        .collect();
    validate.sort_unstable();
    live.sort_unstable();
    assert_eq!(validate, vec![50, 100, 100]);
    assert_eq!(live, vec![100, 100]);
    assert!(calls.iter().all(|c| match c {
        Call::Validate(n) | Call::Live(n) => *n <= MAX_BATCH_SIZE,
    }));
}

#[tokio::test]
async fn test_classify_completeness() {
    let logins: Vec<String> = (0..250).map(|i| format!("Name{i}")).collect();
    let lowered: Vec<String> = logins.iter().map(|l| l.to_lowercase()).collect();
    let names: Vec<&str> = lowered.iter().map(String::as_str).collect();
    let query = FakeQuery::new(&names[..100]);
    query.set_live(&names[..40]);
    let checker = TwitchChecker::new(query.clone(), 0);

    let mut input = logins.clone();
    input.push("NAME0".to_string());
    input.push("   ".to_string());
    let result = checker.classify(&input).await.unwrap();

    assert_eq!(result.len(), 250);
    let count = |c: Classification| result.values().filter(|v| **v == c).count();
    assert_eq!(count(Classification::ExistsAndLive), 40);
    assert_eq!(count(Classification::ExistsButNotLive), 60);
    assert_eq!(count(Classification::DoesNotExist), 150);
    assert_eq!(result["name0"], Classification::ExistsAndLive);

    // Only the 100 existing logins are asked about liveness.
    let live_total: usize = query
        .calls()
        .iter()
        .filter_map(|c| match c {
            Call::Live(n) => Some(*n),
            Call::Validate(_) => None,
        })
        .sum();
    assert_eq!(live_total, 100);
    assert_eq!(checker.channels().count(), 0);
}

#[tokio::test]
async fn test_live_but_nonexistent_is_does_not_exist() {
    let query = FakeQuery::new(&[]);
    query.set_live(&["phantom"]);
    let checker = TwitchChecker::new(query, 0);

    let result = checker.classify(["phantom"]).await.unwrap();
    assert_eq!(result["phantom"], Classification::DoesNotExist);
}

#[tokio::test]
async fn test_events_published_for_transitions() {
    let query = FakeQuery::new(&["a", "b"]);
    let mut checker = TwitchChecker::with_channels(query.clone(), 0, ["a", "b"]).unwrap();
    let mut events = checker.subscribe();

    query.set_live(&["a"]);
    checker.poll_at(at(0)).await.unwrap();
    query.set_live(&[]);
    checker.poll_at(at(30)).await.unwrap();
    checker.poll_at(at(60)).await.unwrap();

    let first = events.try_recv().unwrap();
    assert!(matches!(
        &first,
        ChannelEvent::WentLive { login, title: Some(title), started_at: Some(_), timestamp, .. }
            if login.as_str() == "a" && title == "a playing" && *timestamp == at(0)
    ));
    let second = events.try_recv().unwrap();
    assert!(matches!(
        &second,
        ChannelEvent::WentOffline { login, timestamp }
            if login.as_str() == "a" && *timestamp == at(30)
    ));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_save_load_continues_debounce() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let query = FakeQuery::new(&["a"]);
    let mut checker = TwitchChecker::with_channels(query.clone(), 300, ["a"]).unwrap();
    query.set_live(&["a"]);
    checker.poll_at(at(0)).await.unwrap();
    query.set_live(&[]);
    checker.poll_at(at(60)).await.unwrap();
    checker.save(&path).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("secret"));

    let mut restored = TwitchChecker::load(&path, query.clone()).unwrap();
    assert_eq!(restored.snapshot(), checker.snapshot());
    assert_eq!(restored.cooldown_seconds(), 300);

    query.clear_calls();
    let statuses = restored.poll_at(at(360)).await.unwrap();
    assert_eq!(changes(&statuses), vec![("a", Some(StatusChange::Down))]);
    // Restored channels are validated again before being queried.
    assert_eq!(query.calls(), vec![Call::Validate(1), Call::Live(1)]);
}

#[tokio::test]
async fn test_load_rejects_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(
        &path,
        r#"{"version":1,"cooldown_seconds":10,"channels":[{"login":"a","is_live":false,"pending_since":"2024-05-01T12:00:00Z"}]}"#,
    )
    .unwrap();

    let err = TwitchChecker::load(&path, FakeQuery::new(&[])).unwrap_err();
    assert!(matches!(err, Error::CorruptSnapshot(_)));

    let missing = TwitchChecker::load(&dir.path().join("nope.json"), FakeQuery::new(&[]));
    assert!(matches!(missing, Err(Error::IoPath { .. })));
}
