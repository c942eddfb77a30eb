//! JSON configuration files for UI components.
//!
//! Each component's configuration lives in `<name>.json` inside one
//! directory. Files are read through a `cap_std` directory handle, so a
//! component name can never reach outside that directory, and parsed
//! documents are cached for a fixed TTL.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::clock::Clock;

/// How long a loaded configuration is served from cache.
pub const COMPONENT_CONFIG_TTL: Duration = Duration::from_secs(5 * 60);
/// Longest accepted component name.
pub const MAX_COMPONENT_NAME_LEN: usize = 100;

/// Errors raised by [`ComponentConfigLoader`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComponentConfigError {
    /// The configuration directory could not be opened.
    #[error("failed to open component config directory '{path}': {message}")]
    DirectoryUnavailable {
        /// Directory path.
        path: Utf8PathBuf,
        /// Error details.
        message: String,
    },
    /// The component name is empty, too long, or contains characters other
    /// than ASCII alphanumerics, `_`, and `-`.
    #[error("invalid component name '{name}'")]
    InvalidName {
        /// Rejected name.
        name: String,
    },
    /// No configuration file exists for the component.
    #[error("no configuration found for component '{name}'")]
    NotFound {
        /// Component name.
        name: String,
    },
    /// The configuration file could not be read.
    #[error("failed to read configuration for component '{name}': {message}")]
    Read {
        /// Component name.
        name: String,
        /// Error details.
        message: String,
    },
    /// The configuration file is not valid JSON of the expected shape.
    #[error("failed to parse configuration for component '{name}': {message}")]
    Parse {
        /// Component name.
        name: String,
        /// Error details.
        message: String,
    },
}

#[derive(Debug, Clone)]
struct CachedConfig {
    document: Value,
    loaded_at: u64,
}

/// Loads and caches component configuration files.
pub struct ComponentConfigLoader {
    root: Utf8PathBuf,
    dir: Dir,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
    cache: Mutex<HashMap<String, CachedConfig>>,
}

impl std::fmt::Debug for ComponentConfigLoader {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ComponentConfigLoader")
            .field("root", &self.root)
            .field("ttl_ms", &self.ttl_ms)
            .finish_non_exhaustive()
    }
}

impl ComponentConfigLoader {
    /// Opens `root` as the configuration directory.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentConfigError::DirectoryUnavailable`] when the
    /// directory cannot be opened.
    pub fn open(root: &Utf8Path, clock: Arc<dyn Clock>) -> Result<Self, ComponentConfigError> {
        let dir = Dir::open_ambient_dir(root, ambient_authority()).map_err(|error| {
            ComponentConfigError::DirectoryUnavailable {
                path: root.to_owned(),
                message: error.to_string(),
            }
        })?;
        Ok(Self {
            root: root.to_owned(),
            dir,
            clock,
            ttl_ms: duration_ms(COMPONENT_CONFIG_TTL),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Overrides the cache lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = duration_ms(ttl);
        self
    }

    /// Directory the loader reads from.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedConfig>> {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    const fn is_fresh(&self, entry: &CachedConfig, now: u64) -> bool {
        now.saturating_sub(entry.loaded_at) < self.ttl_ms
    }

    /// Returns the configuration for `name`, reading the file when the
    /// cached copy is missing or older than the TTL.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentConfigError`] when the name is invalid or the
    /// file is missing, unreadable, or not JSON.
    pub fn load(&self, name: &str) -> Result<Value, ComponentConfigError> {
        validate_name(name)?;
        let now = self.clock.now_millis();
        if let Some(entry) = self.lock().get(name) {
            if self.is_fresh(entry, now) {
                return Ok(entry.document.clone());
            }
        }

        let document = self.read(name)?;
        self.lock().insert(
            name.to_owned(),
            CachedConfig {
                document: document.clone(),
                loaded_at: now,
            },
        );
        tracing::debug!("loaded component config '{name}'");
        Ok(document)
    }

    /// Loads `name` and deserialises it into `T`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::load`], and
    /// [`ComponentConfigError::Parse`] when the document does not match `T`.
    pub fn load_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, ComponentConfigError> {
        serde_json::from_value(self.load(name)?).map_err(|error| ComponentConfigError::Parse {
            name: name.to_owned(),
            message: error.to_string(),
        })
    }

    fn read(&self, name: &str) -> Result<Value, ComponentConfigError> {
        let file_name = format!("{name}.json");
        let content = self
            .dir
            .read_to_string(&file_name)
            .map_err(|error| match error.kind() {
                io::ErrorKind::NotFound => ComponentConfigError::NotFound {
                    name: name.to_owned(),
                },
                _ => ComponentConfigError::Read {
                    name: name.to_owned(),
                    message: error.to_string(),
                },
            })?;
        serde_json::from_str(&content).map_err(|error| ComponentConfigError::Parse {
            name: name.to_owned(),
            message: error.to_string(),
        })
    }

    /// Drops every cached document.
    pub fn clear_cache(&self) {
        self.lock().clear();
    }

    /// Names with an unexpired cached document, sorted.
    #[must_use]
    pub fn cached_names(&self) -> Vec<String> {
        let now = self.clock.now_millis();
        let mut names: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, entry)| self.is_fresh(entry, now))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

fn validate_name(name: &str) -> Result<(), ComponentConfigError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_COMPONENT_NAME_LEN
        && name
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ComponentConfigError::InvalidName {
            name: name.to_owned(),
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests;
