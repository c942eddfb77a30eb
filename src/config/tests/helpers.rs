//! Shared test helpers for configuration tests.

use ortho_config::MergeComposer;
use serde_json::Value;

use crate::SimtrackConfig;

/// Applies a configuration layer to the composer based on the layer type.
pub fn apply_layer(composer: &mut MergeComposer, layer_type: &str, value: Value) {
    match layer_type {
        "defaults" => composer.push_defaults(value),
        "file" => composer.push_file(value, None),
        "environment" => composer.push_environment(value),
        "cli" => composer.push_cli(value),
        _ => panic!("unknown layer type: {layer_type}"),
    }
}

/// Composes a [`SimtrackConfig`] from a sequence of `(layer_type, value)` pairs.
pub fn build_config_from_layers(layers: &[(&str, Value)]) -> SimtrackConfig {
    let mut composer = MergeComposer::new();

    for (layer_type, value) in layers {
        apply_layer(&mut composer, layer_type, value.clone());
    }

    SimtrackConfig::merge_from_layers(composer.layers()).expect("merge should succeed")
}

/// Loads a [`SimtrackConfig`] from CLI arguments with the given environment,
/// isolated from any configuration files in the developer's home directory.
pub fn load_with_env(env: &[(&str, Option<&str>)], cli_args: &[&str]) -> SimtrackConfig {
    let temp_dir = tempfile::TempDir::new().expect("temp dir should be created");
    let home = temp_dir.path().to_string_lossy().to_string();

    let mut vars: Vec<(&str, Option<&str>)> = env.to_vec();
    vars.push(("HOME", Some(home.as_str())));
    vars.push(("XDG_CONFIG_HOME", Some(home.as_str())));
    let _guard = env_lock::lock_env(vars);

    let mut args: Vec<std::ffi::OsString> = vec![std::ffi::OsString::from("simtrack")];
    args.extend(cli_args.iter().map(std::ffi::OsString::from));

    <SimtrackConfig as ortho_config::OrthoConfig>::load_from_iter(args)
        .expect("config should load")
}
