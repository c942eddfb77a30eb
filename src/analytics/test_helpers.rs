//! Shared fixtures for analytics unit tests.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::clock::{ManualClock, SequentialIdGenerator};
use crate::persistence::{DurableStore, MemoryBackend, StoreOptions};
use crate::session::SessionTracker;
use crate::telemetry::test_support::RecordingSink;

use super::collector::{CollectorDeps, EventCollector, QueueLimits};
use super::context::{Connectivity, HostContext};
use super::settings::{LiveSettings, TrackerSettings};

pub(crate) const START_MS: u64 = 1_700_000_000_000;

pub(crate) struct Pipeline {
    pub(crate) store: Arc<DurableStore>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) sink: Arc<RecordingSink>,
    pub(crate) session: Arc<SessionTracker>,
    pub(crate) live: Arc<LiveSettings>,
    pub(crate) connectivity: Connectivity,
    pub(crate) collector: Arc<EventCollector>,
}

pub(crate) fn pipeline(settings: &TrackerSettings) -> Pipeline {
    let clock = Arc::new(ManualClock::new(START_MS));
    let sink = Arc::new(RecordingSink::default());
    let ids = Arc::new(SequentialIdGenerator::default());
    let store = Arc::new(DurableStore::new(
        Box::new(MemoryBackend::new()),
        StoreOptions::default(),
        clock.clone(),
        sink.clone(),
    ));
    let session = Arc::new(SessionTracker::new(
        store.clone(),
        clock.clone(),
        ids.clone(),
        sink.clone(),
        settings.session,
    ));
    let live = Arc::new(LiveSettings::new(settings));
    let connectivity = Connectivity::new(true);
    let collector = Arc::new(EventCollector::new(
        CollectorDeps {
            session: session.clone(),
            context: Arc::new(HostContext::new("en-GB", connectivity.clone())),
            live: live.clone(),
            clock: clock.clone(),
            ids,
            telemetry: sink.clone(),
        },
        QueueLimits {
            max_size: settings.max_queue_size,
            trim_size: settings.queue_trim_size,
        },
    ));
    Pipeline {
        store,
        clock,
        sink,
        session,
        live,
        connectivity,
        collector,
    }
}

pub(crate) fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be a JSON object, got {other}"),
    }
}
