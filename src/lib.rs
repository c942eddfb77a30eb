//! Simtrack library crate: telemetry for an educational simulation platform.
//!
//! The library records learner interactions as validated, privacy-sanitised
//! events, groups them into sessions, and delivers them in batches to a
//! remote collector, falling back to a durable local store when the
//! collector is absent or unreachable. Failed batches are kept for replay.
//! A small loader serves per-component JSON configuration with a TTL cache.

pub mod analytics;
pub mod clock;
pub mod component_config;
pub mod config;
pub mod error;
pub mod persistence;
pub mod session;
pub mod telemetry;

pub use analytics::{
    BatchTransport, Event, EventName, HostSignal, HttpTransport, HttpTransportConfig,
    TrackOutcome, Tracker, TrackerDeps, TrackerSettings,
};
pub use component_config::{ComponentConfigError, ComponentConfigLoader};
pub use config::{OperationMode, SimtrackConfig};
pub use error::SimtrackError;
pub use persistence::{DurableStore, StoreOptions};
pub use session::{SessionSummary, SessionTracker};
