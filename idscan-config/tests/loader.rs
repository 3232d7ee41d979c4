use std::collections::HashMap;
use std::fs;

use idscan_config::{ConfigLoadError, ConfigLoader, ConfigSource};
use tempfile::TempDir;

fn loader(dir: &TempDir, vars: &[(&str, &str)]) -> ConfigLoader {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ConfigLoader::new()
        .with_base_dir(dir.path())
        .with_env_map(vars)
}

#[test]
fn falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let load = loader(&dir, &[]).load().unwrap();

    assert_eq!(load.source, ConfigSource::Default);
    assert_eq!(load.config.fallback.barcode_timeout_ms, 10_000);
    assert!(load.warnings.is_empty());
    assert!(load.overrides.is_empty());
    assert!(load.env_file_loaded.is_none());
}

#[test]
fn picks_up_default_candidate_file() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("config")).unwrap();
    let path = dir.path().join("config/idscan.toml");
    fs::write(&path, "[fallback]\nbarcode_timeout_ms = 4000\n").unwrap();

    let load = loader(&dir, &[]).load().unwrap();

    assert_eq!(load.source, ConfigSource::File(path));
    assert_eq!(load.config.fallback.barcode_timeout_ms, 4_000);
    // untouched fields keep their defaults
    assert_eq!(load.config.fallback.ocr_timeout_ms, 15_000);
}

#[test]
fn env_path_wins_over_inline_json_and_candidates() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("idscan.toml"), "transition_grace_ms = 10\n").unwrap();
    fs::write(
        dir.path().join("custom.json"),
        r#"{"transition_grace_ms": 50}"#,
    )
    .unwrap();

    let load = loader(
        &dir,
        &[
            ("IDSCAN_CONFIG_PATH", "custom.json"),
            ("IDSCAN_CONFIG_JSON", r#"{"transition_grace_ms": 99}"#),
        ],
    )
    .load()
    .unwrap();

    assert_eq!(
        load.source,
        ConfigSource::EnvPath(dir.path().join("custom.json"))
    );
    assert_eq!(load.config.transition_grace_ms, 50);
}

#[test]
fn inline_json_beats_candidate_files() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("idscan.toml"), "transition_grace_ms = 10\n").unwrap();

    let load = loader(
        &dir,
        &[(
            "IDSCAN_CONFIG_JSON",
            r#"{"fallback": {"max_barcode_attempts": 2}}"#,
        )],
    )
    .load()
    .unwrap();

    assert_eq!(load.source, ConfigSource::EnvInline);
    assert_eq!(load.config.fallback.max_barcode_attempts, 2);
    assert_eq!(load.config.transition_grace_ms, 300);
}

#[test]
fn unknown_extension_tries_toml_then_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scan.conf");
    fs::write(&path, r#"{"mailbox_capacity": 8}"#).unwrap();

    let load = loader(&dir, &[]).with_path(&path).load().unwrap();

    assert_eq!(load.source, ConfigSource::File(path));
    assert_eq!(load.config.mailbox_capacity, 8);
}

#[test]
fn env_overrides_apply_on_top_of_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("idscan.toml"),
        "[fallback]\nbarcode_timeout_ms = 4000\nocr_timeout_ms = 6000\n",
    )
    .unwrap();

    let load = loader(
        &dir,
        &[
            ("IDSCAN_BARCODE_TIMEOUT", "3s"),
            ("IDSCAN_MAX_PROCESSING_TIME", "20000"),
            ("IDSCAN_AUTO_FALLBACK", "yes"),
            ("IDSCAN_MIN_QUALITY", "0.65"),
            ("IDSCAN_TRANSITION_GRACE", "150ms"),
        ],
    )
    .load()
    .unwrap();

    let fallback = load.config.fallback;
    assert_eq!(fallback.barcode_timeout_ms, 3_000);
    assert_eq!(fallback.ocr_timeout_ms, 6_000);
    assert_eq!(fallback.max_fallback_processing_time_ms, 20_000);
    assert!(fallback.enable_auto_fallback);
    assert!((fallback.min_quality_threshold - 0.65).abs() < f32::EPSILON);
    assert_eq!(load.config.transition_grace_ms, 150);
    assert_eq!(
        load.overrides,
        vec![
            "IDSCAN_BARCODE_TIMEOUT",
            "IDSCAN_MAX_PROCESSING_TIME",
            "IDSCAN_AUTO_FALLBACK",
            "IDSCAN_MIN_QUALITY",
            "IDSCAN_TRANSITION_GRACE",
        ]
    );
}

#[test]
fn dotenv_fills_gaps_behind_process_env() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".env"),
        "IDSCAN_MAX_BARCODE_ATTEMPTS=7\nIDSCAN_OCR_TIMEOUT=9s\n",
    )
    .unwrap();

    let load = loader(&dir, &[("IDSCAN_OCR_TIMEOUT", "8s")]).load().unwrap();

    assert_eq!(load.env_file_loaded, Some(dir.path().join(".env")));
    assert_eq!(load.config.fallback.max_barcode_attempts, 7);
    assert_eq!(load.config.fallback.ocr_timeout_ms, 8_000);
}

#[test]
fn dotenv_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".env"), "IDSCAN_MAX_BARCODE_ATTEMPTS=7\n").unwrap();

    let load = loader(&dir, &[]).without_dotenv().load().unwrap();

    assert!(load.env_file_loaded.is_none());
    assert_eq!(load.config.fallback.max_barcode_attempts, 5);
}

#[test]
fn malformed_override_names_the_variable() {
    let dir = TempDir::new().unwrap();
    let err = loader(&dir, &[("IDSCAN_AUTO_FALLBACK", "sometimes")])
        .load()
        .unwrap_err();

    match err {
        ConfigLoadError::InvalidEnv { name, value, .. } => {
            assert_eq!(name, "IDSCAN_AUTO_FALLBACK");
            assert_eq!(value, "sometimes");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn invalid_values_are_rejected_after_overrides() {
    let dir = TempDir::new().unwrap();
    let err = loader(&dir, &[("IDSCAN_BARCODE_TIMEOUT", "0")])
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Invalid(_)));

    let err = loader(&dir, &[("IDSCAN_MIN_QUALITY", "1.5")])
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Invalid(_)));
}

#[test]
fn missing_explicit_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let err = loader(&dir, &[])
        .with_path("nope.toml")
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Io { .. }));
}

#[test]
fn unparseable_file_reports_origin() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("idscan.json"), "{ not json").unwrap();

    let err = loader(&dir, &[]).load().unwrap_err();
    match err {
        ConfigLoadError::Parse { origin, .. } => assert!(origin.ends_with("idscan.json")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn guard_rail_warnings_are_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    let load = loader(
        &dir,
        &[
            ("IDSCAN_BARCODE_TIMEOUT", "4500"),
            ("IDSCAN_MAX_PROCESSING_TIME", "5000"),
            ("IDSCAN_AUTO_FALLBACK", "off"),
        ],
    )
    .load()
    .unwrap();

    assert_eq!(
        load.warnings.fields(),
        vec!["fallback.barcode_timeout_ms", "fallback.enable_auto_fallback"]
    );
}

#[test]
fn resolved_config_renders_as_toml() {
    let dir = TempDir::new().unwrap();
    let load = loader(&dir, &[]).load().unwrap();
    let rendered = load.to_toml().unwrap();
    assert!(rendered.contains("[fallback]"));
    assert!(rendered.contains("barcode_timeout_ms = 10000"));
}
