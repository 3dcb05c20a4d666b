//! Integration tests for local identity-file discovery and merging.

use std::fs;
use std::path::PathBuf;

use service_config::config::{self, ConfigError, PartialIdentity};
use service_config::store::Service;

fn flags(stage: Option<&str>, stack: Option<&str>, app: Option<&str>) -> PartialIdentity {
    PartialIdentity {
        stage: stage.map(str::to_string),
        stack: stack.map(str::to_string),
        app: app.map(str::to_string),
    }
}

#[test]
fn flags_override_file_values_per_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".service-config");
    fs::write(&path, r#"{"Stack":"deploy","Stage":"PROD","App":"example"}"#).unwrap();

    let service = config::resolve_from(flags(Some("CODE"), None, None), &[path]).unwrap();

    assert_eq!(
        service,
        Service {
            stage: "CODE".to_string(),
            stack: "deploy".to_string(),
            app: "example".to_string(),
        }
    );
}

#[test]
fn missing_files_are_skipped_and_the_first_readable_one_wins() {
    let dir = tempfile::tempdir().unwrap();
    let absent = dir.path().join("no-such-file");
    let first = dir.path().join(".service-config");
    let second = dir.path().join("tags.json");
    fs::write(&first, r#"{"Stage":"TEST","Stack":"a","App":"b"}"#).unwrap();
    fs::write(&second, r#"{"Stage":"PROD","Stack":"x","App":"y"}"#).unwrap();

    let service = config::resolve_from(
        PartialIdentity::default(),
        &[absent, first, second],
    )
    .unwrap();

    assert_eq!(service.stage, "TEST");
    assert_eq!(service.stack, "a");
    assert_eq!(service.app, "b");
}

#[test]
fn a_malformed_config_file_is_an_error_not_a_fallthrough() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".service-config");
    fs::write(&path, "not json at all").unwrap();

    let err =
        config::resolve_from(flags(Some("TEST"), Some("a"), Some("b")), &[path]).unwrap_err();
    assert!(matches!(err, ConfigError::Json { .. }));
}

#[test]
fn resolution_fails_when_identity_is_still_incomplete() {
    let paths: Vec<PathBuf> = Vec::new();

    let err = config::resolve_from(flags(Some("TEST"), None, Some("b")), &paths).unwrap_err();
    match err {
        ConfigError::Incomplete { stage, stack, app } => {
            assert_eq!(stage, "TEST");
            assert_eq!(stack, "");
            assert_eq!(app, "b");
        }
        other => panic!("expected Incomplete, got {other:?}"),
    }
}

#[test]
fn written_identity_round_trips_through_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".service-config");
    let service = Service {
        stage: "TEST".to_string(),
        stack: "my-stack".to_string(),
        app: "my-app".to_string(),
    };

    config::write_to(&path, &service).unwrap();

    // The file uses the capitalised field names provisioning writes.
    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains(r#""Stage":"TEST""#), "unexpected file body: {raw}");

    let resolved = config::resolve_from(PartialIdentity::default(), &[path]).unwrap();
    assert_eq!(resolved, service);
}
