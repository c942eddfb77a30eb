//! Environment context attached to every event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

/// Shared online/offline flag, updated from host signals.
#[derive(Debug, Clone)]
pub struct Connectivity(Arc<AtomicBool>);

impl Connectivity {
    /// Creates a flag with the given initial state.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    /// Returns true while the host reports connectivity.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Records the host's connectivity state.
    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::Release);
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Coarse memory pressure reported by the host, when it can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressure {
    /// Plenty of headroom.
    Nominal,
    /// Usage is high.
    Elevated,
    /// The host is close to its limit.
    Critical,
}

/// Context fields inserted under the `context` key of each event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentContext {
    /// Preferred language tag, such as `en-GB`.
    pub language: String,
    /// Whether the host was online when the event was tracked.
    pub online: bool,
    /// Memory pressure, omitted when unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_pressure: Option<MemoryPressure>,
}

/// Supplies the context attached to events.
pub trait ContextProvider: Send + Sync {
    /// Captures the current context.
    fn snapshot(&self) -> EnvironmentContext;
}

/// Context drawn from the running process.
#[derive(Debug, Clone)]
pub struct HostContext {
    language: String,
    connectivity: Connectivity,
    memory_pressure: Option<MemoryPressure>,
}

impl HostContext {
    /// Creates a provider reporting `language` and the live connectivity
    /// flag.
    #[must_use]
    pub fn new(language: impl Into<String>, connectivity: Connectivity) -> Self {
        Self {
            language: language.into(),
            connectivity,
            memory_pressure: None,
        }
    }

    /// Reports a fixed memory pressure level.
    #[must_use]
    pub const fn with_memory_pressure(mut self, pressure: MemoryPressure) -> Self {
        self.memory_pressure = Some(pressure);
        self
    }
}

impl ContextProvider for HostContext {
    fn snapshot(&self) -> EnvironmentContext {
        EnvironmentContext {
            language: self.language.clone(),
            online: self.connectivity.is_online(),
            memory_pressure: self.memory_pressure,
        }
    }
}

/// Derives a language tag from a POSIX locale such as `en_GB.UTF-8`.
///
/// Returns `None` for the `C` and `POSIX` locales.
#[must_use]
pub fn language_from_locale(locale: &str) -> Option<String> {
    let base = locale.split(['.', '@']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}
