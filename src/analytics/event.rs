//! Tracked events and event-name validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Longest accepted event name, in characters.
pub const MAX_EVENT_NAME_LEN: usize = 100;

/// Reasons an event name is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventNameError {
    /// The name is empty.
    #[error("event name is empty")]
    Empty,
    /// The name is longer than [`MAX_EVENT_NAME_LEN`].
    #[error("event name is {length} characters; the limit is {MAX_EVENT_NAME_LEN}")]
    TooLong {
        /// Length of the rejected name.
        length: usize,
    },
    /// The name contains a character outside `[A-Za-z0-9_.:-]`.
    #[error("event name contains disallowed character {character:?}")]
    InvalidCharacter {
        /// First offending character.
        character: char,
    },
}

/// A validated event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventName(String);

impl EventName {
    /// Validates `raw` as an event name.
    ///
    /// # Errors
    ///
    /// Returns [`EventNameError`] when the name is empty, too long, or
    /// contains characters other than ASCII alphanumerics, `_`, `-`, `.`,
    /// and `:`.
    pub fn parse(raw: &str) -> Result<Self, EventNameError> {
        if raw.is_empty() {
            return Err(EventNameError::Empty);
        }
        let length = raw.chars().count();
        if length > MAX_EVENT_NAME_LEN {
            return Err(EventNameError::TooLong { length });
        }
        if let Some(character) = raw.chars().find(|character| !is_name_char(*character)) {
            return Err(EventNameError::InvalidCharacter { character });
        }
        Ok(Self(raw.to_owned()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const fn is_name_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || matches!(character, '_' | '-' | '.' | ':')
}

impl TryFrom<String> for EventName {
    type Error = EventNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EventName> for String {
    fn from(value: EventName) -> Self {
        value.0
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// One tracked occurrence.
///
/// Events are built by the collector and never mutated after they are
/// enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique identifier (`evt_<timestamp>_<suffix>`).
    pub event_id: String,
    /// Validated event name.
    pub name: EventName,
    /// Sanitised payload, including the `context` entry.
    pub data: Map<String, Value>,
    /// Milliseconds since the Unix epoch, possibly floored to the hour.
    pub timestamp: u64,
    /// Session the event belongs to.
    pub session_id: String,
}
