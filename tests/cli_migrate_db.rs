//! Subprocess tests for `simtrack --migrate-db`.
//!
//! A migration run must create or upgrade the schema, report the schema
//! version on stderr, and never read events from stdin.

mod support;

#[path = "support/cli.rs"]
mod cli;

use std::path::PathBuf;
use std::process::Output;

use rstest::{fixture, rstest};
use simtrack::persistence::CURRENT_SCHEMA_VERSION;
use tempfile::TempDir;

use cli::run_simtrack;
use support::create_temp_dir;

/// A scratch directory holding one database file.
struct ScratchDb {
    _dir: TempDir,
    path: PathBuf,
}

impl ScratchDb {
    fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

#[fixture]
fn scratch_db() -> ScratchDb {
    let dir = create_temp_dir();
    let path = dir.path().join("events.sqlite");
    ScratchDb { _dir: dir, path }
}

fn migrate(database_url: Option<&str>, env: &[(&str, Option<&str>)]) -> Output {
    let mut args = vec!["--migrate-db"];
    if let Some(url) = database_url {
        args.push("--database-url");
        args.push(url);
    }
    run_simtrack(&args, env, None)
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[rstest]
fn migrating_a_file_database_creates_it(scratch_db: ScratchDb) {
    let output = migrate(Some(&scratch_db.url()), &[]);

    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    assert!(scratch_db.path.exists(), "{} missing", scratch_db.path.display());
}

#[test]
fn in_memory_migration_reports_the_schema_version() {
    let output = migrate(Some(":memory:"), &[]);
    let stderr = stderr_of(&output);

    assert_eq!(output.status.code(), Some(0), "stderr: {stderr}");
    assert!(stderr.contains("schema_version_recorded"), "stderr: {stderr}");
    assert!(stderr.contains(CURRENT_SCHEMA_VERSION), "stderr: {stderr}");
}

#[test]
fn stdin_events_are_ignored_while_migrating() {
    let output = run_simtrack(
        &["--migrate-db", "--database-url", ":memory:"],
        &[],
        Some("{\"name\": \"step\"}\n"),
    );

    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    assert!(
        !String::from_utf8_lossy(&output.stdout).contains("Tracked"),
        "migration must not ingest events"
    );
}

#[rstest]
#[case::no_url(None, "database URL is required")]
#[case::whitespace_url(Some("   "), "database URL must not be blank")]
fn unusable_urls_exit_non_zero(#[case] database_url: Option<&str>, #[case] expected: &str) {
    let output = migrate(database_url, &[]);
    let stderr = stderr_of(&output);

    assert_eq!(output.status.code(), Some(1), "stderr: {stderr}");
    assert!(stderr.contains(expected), "stderr: {stderr}");
}

#[test]
fn a_directory_is_not_a_database() {
    let dir = create_temp_dir();
    let output = migrate(Some(&dir.path().to_string_lossy()), &[]);

    assert!(!output.status.success());
    assert!(
        stderr_of(&output).contains("failed to connect to SQLite database"),
        "stderr: {}",
        stderr_of(&output)
    );
}

#[rstest]
#[case::env_only(None, ":memory:")]
#[case::flag_beats_blank_env(Some(":memory:"), "   ")]
fn database_url_resolves_across_layers(#[case] flag: Option<&str>, #[case] env_value: &str) {
    let output = migrate(flag, &[("SIMTRACK_DATABASE_URL", Some(env_value))]);

    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
}

#[rstest]
fn repeated_migrations_are_no_ops(scratch_db: ScratchDb) {
    let url = scratch_db.url();

    for attempt in 1..=2 {
        let output = migrate(Some(&url), &[]);
        let stderr = stderr_of(&output);
        assert!(output.status.success(), "attempt {attempt} failed: {stderr}");
        assert!(
            stderr.contains(CURRENT_SCHEMA_VERSION),
            "attempt {attempt} should report the schema version"
        );
    }
}
