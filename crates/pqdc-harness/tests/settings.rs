use std::io::Write;
use std::time::Duration;

use pqdc_harness::{HarnessSettings, ObserverRole, ScenarioKind, SettingsError};

fn write_temp(suffix: &str, body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    file.write_all(body.as_bytes()).expect("write settings");
    file
}

#[test]
fn loads_yaml_from_disk() {
    let file = write_temp(
        ".yaml",
        "scenarios:\n  - baseline\n  - no-extension\nclient_message: ping\nserver_message: pong\n",
    );
    let settings = HarnessSettings::load(file.path()).expect("yaml settings");
    assert_eq!(
        settings.scenarios,
        vec![ScenarioKind::Baseline, ScenarioKind::NoExtension]
    );
    assert_eq!(settings.client_message, "ping");
    assert_eq!(settings.server_message, "pong");
    assert_eq!(settings.deadline(), None);
}

#[test]
fn loads_json_from_disk() {
    let file = write_temp(
        ".json",
        r#"{"scenarios": ["post-quantum"], "deadline_ms": 750, "observer": "client"}"#,
    );
    let settings = HarnessSettings::load(file.path()).expect("json settings");
    assert_eq!(settings.scenarios, vec![ScenarioKind::PostQuantum]);
    assert_eq!(settings.deadline(), Some(Duration::from_millis(750)));
    assert_eq!(settings.observer, Some(ObserverRole::Client));
}

#[test]
fn unknown_scenario_is_rejected() {
    let file = write_temp(".yml", "scenarios: [handshake-only]\n");
    assert!(matches!(
        HarnessSettings::load(file.path()),
        Err(SettingsError::Yaml { .. })
    ));
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("absent.yaml");
    match HarnessSettings::load(&path) {
        Err(SettingsError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("unexpected result: {other:?}"),
    }
}
