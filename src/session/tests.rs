//! Unit tests for session tracking.

use std::sync::Arc;

use rstest::{fixture, rstest};

use super::{SessionSettings, SessionTracker, TrendDirection};
use crate::clock::{ManualClock, SequentialIdGenerator};
use crate::persistence::{DurableStore, MemoryBackend, StoreOptions};
use crate::telemetry::TelemetryEvent;
use crate::telemetry::test_support::RecordingSink;

struct Harness {
    store: Arc<DurableStore>,
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
}

impl Harness {
    fn tracker(&self, settings: SessionSettings) -> SessionTracker {
        SessionTracker::new(
            self.store.clone(),
            self.clock.clone(),
            Arc::new(SequentialIdGenerator::default()),
            self.sink.clone(),
            settings,
        )
    }
}

#[fixture]
fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let sink = Arc::new(RecordingSink::default());
    let store = Arc::new(DurableStore::new(
        Box::new(MemoryBackend::new()),
        StoreOptions::default(),
        clock.clone(),
        sink.clone(),
    ));
    Harness { store, clock, sink }
}

#[rstest]
fn session_id_is_idempotent(harness: Harness) {
    let tracker = harness.tracker(SessionSettings::default());

    let first = tracker.get_or_create_session_id();
    let second = tracker.get_or_create_session_id();

    assert_eq!(first, second);
    assert_eq!(first, "session_1700000000000_000001");
}

#[rstest]
fn session_resumes_across_restarts_within_lifetime(harness: Harness) {
    let before_restart = harness.tracker(SessionSettings::default());
    let first = before_restart.get_or_create_session_id();
    before_restart.record_event();
    before_restart.record_event();

    harness.clock.advance(60_000);
    let after_restart = harness.tracker(SessionSettings::default());
    let resumed = after_restart.get_or_create_session_id();
    after_restart.record_event();
    let summary = after_restart
        .end_session()
        .expect("resumed session should be active");

    assert_eq!(first, resumed);
    assert_eq!(summary.id, first);
    assert_eq!(summary.event_count, 3);
    assert_eq!(summary.duration, 60_000);
}

#[rstest]
fn activity_keeps_the_session_alive_past_its_ttl(harness: Harness) {
    let settings = SessionSettings {
        session_ttl_ms: 1_000,
        ..SessionSettings::default()
    };
    let tracker = harness.tracker(settings);
    let first = tracker.get_or_create_session_id();

    for _ in 0..3 {
        harness.clock.advance(800);
        tracker.record_event();
    }
    harness.clock.advance(800);
    let restarted = harness.tracker(settings);
    let resumed = restarted.get_or_create_session_id();

    assert_eq!(first, resumed);
    assert_eq!(
        restarted.current().map(|session| session.event_count),
        Some(3)
    );
}

#[rstest]
fn expired_session_is_regenerated(harness: Harness) {
    let settings = SessionSettings {
        session_ttl_ms: 1_000,
        ..SessionSettings::default()
    };
    let first = harness.tracker(settings).get_or_create_session_id();

    harness.clock.advance(1_001);
    let next = harness.tracker(settings).get_or_create_session_id();

    assert_ne!(first, next);
}

#[rstest]
fn end_session_records_duration_and_event_count(harness: Harness) {
    let tracker = harness.tracker(SessionSettings::default());
    let id = tracker.get_or_create_session_id();
    tracker.record_event();
    tracker.record_event();
    harness.clock.advance(5_000);

    let summary = tracker.end_session().expect("session should be active");

    assert_eq!(summary.id, id);
    assert_eq!(summary.duration, 5_000);
    assert_eq!(summary.event_count, 2);
    assert_eq!(tracker.history(), vec![summary.clone()]);
    assert!(harness.sink.take().contains(&TelemetryEvent::SessionEnded {
        session_id: id,
        duration_ms: 5_000,
        event_count: 2,
    }));
    assert!(tracker.end_session().is_none(), "second end is a no-op");
}

#[rstest]
fn ending_a_session_starts_a_fresh_one_next_time(harness: Harness) {
    let tracker = harness.tracker(SessionSettings::default());
    let first = tracker.get_or_create_session_id();
    tracker.end_session();

    let second = tracker.get_or_create_session_id();

    assert_ne!(first, second);
}

#[rstest]
fn history_evicts_oldest_beyond_limit(harness: Harness) {
    let tracker = harness.tracker(SessionSettings {
        history_limit: 3,
        ..SessionSettings::default()
    });

    let ids: Vec<String> = (0..5)
        .map(|_| {
            let id = tracker.get_or_create_session_id();
            harness.clock.advance(10);
            tracker.end_session();
            id
        })
        .collect();

    let kept: Vec<String> = tracker
        .history()
        .into_iter()
        .map(|summary| summary.id)
        .collect();
    let expected: Vec<String> = ids.into_iter().skip(2).collect();
    assert_eq!(kept, expected);
}

#[rstest]
fn duration_trend_reflects_history(harness: Harness) {
    let tracker = harness.tracker(SessionSettings::default());

    for minutes in [1_u64, 2, 3, 4] {
        tracker.get_or_create_session_id();
        harness.clock.advance(minutes * 60_000);
        tracker.end_session();
    }

    let trend = tracker.duration_trend().expect("enough history");
    assert_eq!(trend.direction, TrendDirection::Increasing);
}
