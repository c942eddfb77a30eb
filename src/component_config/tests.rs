//! Tests for the component configuration loader.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use serde::Deserialize;
use serde_json::json;
use tempfile::TempDir;

use super::{ComponentConfigError, ComponentConfigLoader};
use crate::clock::ManualClock;

struct Fixture {
    _temp: TempDir,
    root: Utf8PathBuf,
    clock: Arc<ManualClock>,
    loader: ComponentConfigLoader,
}

impl Fixture {
    fn write(&self, name: &str, content: &str) {
        std::fs::write(self.root.join(name), content).expect("config file should be written");
    }
}

#[fixture]
fn fixture() -> Fixture {
    let temp = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf-8 temp path");
    let clock = Arc::new(ManualClock::new(0));
    let loader = ComponentConfigLoader::open(&root, clock.clone()).expect("loader should open");
    Fixture {
        _temp: temp,
        root,
        clock,
        loader,
    }
}

#[rstest]
fn loads_and_caches_documents(fixture: Fixture) {
    fixture.write("button.json", r#"{"theme": "dark"}"#);
    assert_eq!(fixture.loader.load("button"), Ok(json!({"theme": "dark"})));

    fixture.write("button.json", r#"{"theme": "light"}"#);
    fixture.clock.advance(299_999);

    assert_eq!(fixture.loader.load("button"), Ok(json!({"theme": "dark"})));
    assert_eq!(fixture.loader.cached_names(), vec!["button"]);
}

#[rstest]
fn reloads_after_the_ttl(fixture: Fixture) {
    fixture.write("button.json", r#"{"theme": "dark"}"#);
    fixture.loader.load("button").expect("first load");
    fixture.write("button.json", r#"{"theme": "light"}"#);

    fixture.clock.advance(300_000);

    assert!(fixture.loader.cached_names().is_empty());
    assert_eq!(fixture.loader.load("button"), Ok(json!({"theme": "light"})));
}

#[rstest]
fn clear_cache_forces_a_reload(fixture: Fixture) {
    fixture.write("slider.json", "[1, 2]");
    fixture.loader.load("slider").expect("first load");
    fixture.write("slider.json", "[3]");

    fixture.loader.clear_cache();

    assert_eq!(fixture.loader.load("slider"), Ok(json!([3])));
}

#[rstest]
fn custom_ttl_is_respected(fixture: Fixture) {
    let loader = ComponentConfigLoader::open(&fixture.root, fixture.clock.clone())
        .expect("loader should open")
        .with_ttl(Duration::from_millis(10));
    fixture.write("card.json", "1");
    loader.load("card").expect("first load");
    fixture.write("card.json", "2");

    fixture.clock.advance(10);

    assert_eq!(loader.load("card"), Ok(json!(2)));
}

#[rstest]
#[case::traversal("../secrets")]
#[case::space("my button")]
#[case::empty("")]
#[case::extension("button.json")]
fn rejects_invalid_names(fixture: Fixture, #[case] name: &str) {
    assert_eq!(
        fixture.loader.load(name),
        Err(ComponentConfigError::InvalidName {
            name: name.to_owned()
        })
    );
}

#[rstest]
fn missing_files_are_not_found(fixture: Fixture) {
    assert_eq!(
        fixture.loader.load("absent"),
        Err(ComponentConfigError::NotFound {
            name: "absent".to_owned()
        })
    );
}

#[rstest]
fn malformed_json_is_a_parse_error(fixture: Fixture) {
    fixture.write("broken.json", "{theme: dark}");

    let error = fixture.loader.load("broken").expect_err("should fail");

    assert!(matches!(error, ComponentConfigError::Parse { ref name, .. } if name == "broken"));
    assert!(fixture.loader.cached_names().is_empty());
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
struct ButtonConfig {
    theme: String,
    size: u8,
}

#[rstest]
fn load_as_deserialises_typed_configs(fixture: Fixture) {
    fixture.write("button.json", r#"{"theme": "dark", "size": 3}"#);

    let config: ButtonConfig = fixture.loader.load_as("button").expect("typed load");

    assert_eq!(
        config,
        ButtonConfig {
            theme: "dark".to_owned(),
            size: 3
        }
    );
    assert!(matches!(
        fixture.loader.load_as::<Vec<u8>>("button"),
        Err(ComponentConfigError::Parse { .. })
    ));
}

#[test]
fn missing_directory_is_reported() {
    let result = ComponentConfigLoader::open(
        camino::Utf8Path::new("/definitely/not/here"),
        Arc::new(ManualClock::new(0)),
    );

    assert!(matches!(
        result,
        Err(ComponentConfigError::DirectoryUnavailable { .. })
    ));
}
