//! Simtrack CLI entrypoint.
//!
//! Ingests JSON-lines events from stdin by default; `--migrate-db`,
//! `--show-sessions`, and `--component` select the other operations.

mod cli;

use std::io::{self, Write};
use std::process::ExitCode;

use ortho_config::OrthoConfig;
use simtrack::{OperationMode, SimtrackConfig, SimtrackError};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if writeln!(io::stderr().lock(), "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), SimtrackError> {
    let config = load_config()?;
    cli::wiring::init_logging(config.debug);

    match config.operation_mode() {
        OperationMode::MigrateDatabase => cli::migrations::run(&config),
        OperationMode::ShowSessions => cli::sessions::run(&config),
        OperationMode::ShowComponent => cli::component::run(&config),
        OperationMode::Ingest => cli::ingest::run(&config).await,
    }
}

/// Loads configuration from CLI, environment, and files.
///
/// # Errors
///
/// Returns [`SimtrackError::Configuration`] when ortho-config fails to parse
/// arguments or load configuration files.
fn load_config() -> Result<SimtrackConfig, SimtrackError> {
    SimtrackConfig::load().map_err(|error| SimtrackError::Configuration {
        message: error.to_string(),
    })
}
