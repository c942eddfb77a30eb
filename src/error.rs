//! Top-level error type surfaced by the CLI and configuration layer.

use thiserror::Error;

use crate::component_config::ComponentConfigError;
use crate::persistence::{PersistenceError, StoreError};

/// Errors surfaced while loading configuration or running a CLI operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SimtrackError {
    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {message}")]
    Configuration {
        /// Details about the configuration failure.
        message: String,
    },

    /// Local I/O operation failed.
    #[error("I/O error: {message}")]
    Io {
        /// Error detail from the underlying I/O operation.
        message: String,
    },

    /// The durable store or its database failed.
    #[error("storage error: {message}")]
    Storage {
        /// Error detail from the persistence layer.
        message: String,
    },

    /// Input read by the CLI was not understood.
    #[error("invalid input on line {line}: {message}")]
    InvalidInput {
        /// One-based input line number.
        line: usize,
        /// Why the line was rejected.
        message: String,
    },
}

impl From<PersistenceError> for SimtrackError {
    fn from(error: PersistenceError) -> Self {
        match error {
            PersistenceError::MissingDatabaseUrl | PersistenceError::BlankDatabaseUrl => {
                Self::Configuration {
                    message: error.to_string(),
                }
            }
            _ => Self::Storage {
                message: error.to_string(),
            },
        }
    }
}

impl From<StoreError> for SimtrackError {
    fn from(error: StoreError) -> Self {
        Self::Storage {
            message: error.to_string(),
        }
    }
}

impl From<ComponentConfigError> for SimtrackError {
    fn from(error: ComponentConfigError) -> Self {
        Self::Configuration {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::SimtrackError;
    use crate::component_config::ComponentConfigError;
    use crate::persistence::PersistenceError;

    #[rstest]
    #[case::missing(PersistenceError::MissingDatabaseUrl, true)]
    #[case::blank(PersistenceError::BlankDatabaseUrl, true)]
    #[case::migration(PersistenceError::MigrationFailed { message: "boom".to_owned() }, false)]
    #[case::quota(PersistenceError::QuotaExceeded { message: "full".to_owned() }, false)]
    fn persistence_errors_split_configuration_from_storage(
        #[case] error: PersistenceError,
        #[case] is_configuration: bool,
    ) {
        let mapped = SimtrackError::from(error);

        assert_eq!(
            matches!(mapped, SimtrackError::Configuration { .. }),
            is_configuration,
            "unexpected mapping: {mapped:?}"
        );
    }

    #[test]
    fn component_errors_are_configuration_errors() {
        let mapped = SimtrackError::from(ComponentConfigError::NotFound {
            name: "button".to_owned(),
        });

        assert_eq!(
            mapped.to_string(),
            "configuration error: no configuration found for component 'button'"
        );
    }
}
