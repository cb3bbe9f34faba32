//! Integration tests for Settings loading from a local config directory.
//!
//! Merge semantics: scalars and arrays given in a higher layer replace the
//! lower layer's value. These tests run against temp directories only.

use std::fs;
use std::time::Duration;

use rstest::rstest;
use tempfile::TempDir;

use domprune::application::services::Schedule;
use domprune::application::ApplicationError;
use domprune::config::{local_config_path, Settings};

// ============================================================
// Settings::load() local layer
// ============================================================

#[test]
fn given_local_schedule_when_load_then_overrides_only_given_fields() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let local = r#"
[schedule]
throttle_ms = 250
retry_delays_ms = [100, 200]
"#;
    fs::write(local_config_path(dir.path()), local).unwrap();

    // Act
    let settings = Settings::load(Some(dir.path())).expect("load settings");
    let schedule = settings.schedule();

    // Assert
    assert_eq!(schedule.throttle, Duration::from_millis(250));
    assert_eq!(
        schedule.retry_delays,
        vec![Duration::from_millis(100), Duration::from_millis(200)],
        "arrays replace the default list"
    );
    assert_eq!(schedule.main_window, Schedule::default().main_window);
    assert_eq!(schedule.nested_window, Schedule::default().nested_window);
}

#[test]
fn given_local_store_settings_when_load_then_store_and_passive_fields_apply() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let local = r#"
store_key = "blocked"
default_selector = ".promo"
passive_prefixes = ["moz-extension://"]
"#;
    fs::write(dir.path().join(".domprune.toml"), local).unwrap();

    // Act
    let settings = Settings::load(Some(dir.path())).expect("load settings");

    // Assert
    assert_eq!(settings.store_key, "blocked");
    assert_eq!(settings.default_selector, ".promo");
    assert_eq!(settings.passive_prefixes, vec!["moz-extension://".to_string()]);
}

#[test]
fn given_unknown_type_when_load_then_fails_with_config_error() {
    // Arrange
    let dir = TempDir::new().unwrap();
    fs::write(
        local_config_path(dir.path()),
        "[schedule]\nthrottle_ms = \"fast\"\n",
    )
    .unwrap();

    // Act
    let result = Settings::load(Some(dir.path()));

    // Assert
    assert!(result.is_err(), "string for a millisecond field must be rejected");
}

#[test]
fn given_template_written_as_local_config_when_load_then_yields_defaults() {
    // Arrange
    let dir = TempDir::new().unwrap();
    fs::write(local_config_path(dir.path()), Settings::template()).unwrap();

    // Act
    let settings = Settings::load(Some(dir.path())).expect("load settings");

    // Assert
    assert_eq!(settings.schedule(), Schedule::default());
    assert_eq!(settings.store_key, "selectors");
}

#[rstest]
#[case("blank_poll_ms")]
#[case("throttle_ms")]
fn given_zero_interval_when_load_then_fails_naming_the_key(#[case] key: &str) {
    // Arrange
    let dir = TempDir::new().unwrap();
    fs::write(local_config_path(dir.path()), format!("[schedule]\n{key} = 0\n")).unwrap();

    // Act
    let result = Settings::load(Some(dir.path()));

    // Assert
    match result {
        Err(ApplicationError::Config { message }) => assert!(message.contains(key), "{message}"),
        other => panic!("expected config error, got {other:?}"),
    }
}
