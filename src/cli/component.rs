//! Prints one component configuration.

use std::sync::Arc;

use camino::Utf8Path;
use simtrack::clock::SystemClock;
use simtrack::{ComponentConfigLoader, SimtrackConfig, SimtrackError};

use super::output::write_component;

/// Directory searched when `--component-config-dir` is not given.
pub const DEFAULT_COMPONENT_CONFIG_DIR: &str = "components";

/// Loads the configured component and prints it as pretty JSON.
///
/// # Errors
///
/// Returns [`SimtrackError::Configuration`] when no component is named or
/// its configuration cannot be loaded, and [`SimtrackError::Io`] when the
/// output cannot be written.
pub fn run(config: &SimtrackConfig) -> Result<(), SimtrackError> {
    let name = config
        .component
        .as_deref()
        .ok_or_else(|| SimtrackError::Configuration {
            message: "component name is required (use --component or -c)".to_owned(),
        })?;
    let directory = config
        .component_config_dir
        .as_deref()
        .unwrap_or(DEFAULT_COMPONENT_CONFIG_DIR);

    let loader = ComponentConfigLoader::open(Utf8Path::new(directory), Arc::new(SystemClock))?;
    let document = loader.load(name)?;
    write_component(name, &document)
}

#[cfg(test)]
mod tests {
    use simtrack::{SimtrackConfig, SimtrackError};
    use tempfile::TempDir;

    use super::run;

    #[test]
    fn missing_component_name_is_a_configuration_error() {
        let result = run(&SimtrackConfig::default());

        assert!(matches!(result, Err(SimtrackError::Configuration { .. })));
    }

    #[test]
    fn unknown_component_is_reported() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config = SimtrackConfig {
            component: Some("slider".to_owned()),
            component_config_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            ..SimtrackConfig::default()
        };

        let error = run(&config).expect_err("component is absent");

        assert_eq!(
            error.to_string(),
            "configuration error: no configuration found for component 'slider'"
        );
    }
}
