//! Helpers for spawning the `simtrack` binary in integration tests.

use std::io::Write;
use std::process::{Command, Output, Stdio};

/// Environment variables cleared before every run so tests stay hermetic.
const HERMETIC_VARS: [&str; 8] = [
    "SIMTRACK_DATABASE_URL",
    "SIMTRACK_MIGRATE_DB",
    "SIMTRACK_ENDPOINT",
    "SIMTRACK_AUTH_TOKEN",
    "SIMTRACK_ENCRYPTION_KEY",
    "SIMTRACK_COMPONENT",
    "SIMTRACK_COMPONENT_CONFIG_DIR",
    "RUST_LOG",
];

/// Returns the path to the built binary.
pub fn binary_path() -> std::path::PathBuf {
    // cargo test builds binaries in target/debug
    let mut path = std::env::current_exe()
        .unwrap_or_else(|error| panic!("failed to get current exe path: {error}"));
    path.pop(); // remove test binary name
    path.pop(); // remove deps
    path.push("simtrack");
    path
}

/// Runs the binary with `args`, `env` overrides, and optional stdin.
pub fn run_simtrack(args: &[&str], env: &[(&str, Option<&str>)], stdin: Option<&str>) -> Output {
    let mut command = Command::new(binary_path());
    command.args(args);
    for key in HERMETIC_VARS {
        command.env_remove(key);
    }

    for (key, value) in env {
        match value {
            Some(env_value) => {
                command.env(key, env_value);
            }
            None => {
                command.env_remove(key);
            }
        }
    }

    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command
        .spawn()
        .unwrap_or_else(|error| panic!("failed to execute binary: {error}"));
    if let Some(mut child_stdin) = child.stdin.take() {
        if let Some(input) = stdin {
            child_stdin
                .write_all(input.as_bytes())
                .unwrap_or_else(|error| panic!("failed to write stdin: {error}"));
        }
    }

    child
        .wait_with_output()
        .unwrap_or_else(|error| panic!("failed to wait for binary: {error}"))
}
