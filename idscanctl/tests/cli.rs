use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

const ENV_VARS: [&str; 9] = [
    "IDSCAN_CONFIG_PATH",
    "IDSCAN_CONFIG_JSON",
    "IDSCAN_BARCODE_TIMEOUT",
    "IDSCAN_OCR_TIMEOUT",
    "IDSCAN_MAX_PROCESSING_TIME",
    "IDSCAN_MAX_BARCODE_ATTEMPTS",
    "IDSCAN_AUTO_FALLBACK",
    "IDSCAN_MIN_QUALITY",
    "IDSCAN_TRANSITION_GRACE",
];

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join(name)
}

/// Command isolated from the developer's environment and working tree.
fn idscanctl(dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("idscanctl");
    cmd.current_dir(dir.path());
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    let output = idscanctl(&dir)
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("simulate"), "help missing simulate");
    assert!(text.contains("config"), "help missing config");

    let output = idscanctl(&dir)
        .args(["simulate", "--help"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("--mode"), "simulate help missing --mode");
    assert!(text.contains("--format"), "simulate help missing --format");
}

#[test]
fn simulate_auto_fallback_completes_via_ocr() {
    let dir = TempDir::new().unwrap();
    idscanctl(&dir)
        .arg("simulate")
        .arg(demo("auto_fallback.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("mode_switched"))
        .stdout(predicate::str::contains("barcode -> ocr (MaxAttempts)"))
        .stdout(predicate::str::contains("completed via ocr"))
        .stdout(predicate::str::contains("final: state=completed"));
}

#[test]
fn simulate_barcode_timeout_falls_back() {
    let dir = TempDir::new().unwrap();
    idscanctl(&dir)
        .arg("simulate")
        .arg(demo("barcode_timeout.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("timed_out"))
        .stdout(predicate::str::contains("barcode after 3000ms"))
        .stdout(predicate::str::contains("final: state=completed"));
}

#[test]
fn simulate_exits_non_zero_when_session_fails() {
    let dir = TempDir::new().unwrap();
    idscanctl(&dir)
        .arg("simulate")
        .arg(demo("permission_denied.json"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("PermissionDenied"))
        .stdout(predicate::str::contains("final: state=failed"));
}

#[test]
fn simulate_mode_flag_overrides_scenario() {
    let dir = TempDir::new().unwrap();
    // Barcode-only never falls back, so the recorded OCR result is ignored.
    idscanctl(&dir)
        .arg("simulate")
        .arg(demo("auto_fallback.json"))
        .args(["--mode", "barcode-only"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("mode_switched").not())
        .stdout(predicate::str::contains("final: state=failed"));
}

#[test]
fn simulate_json_emits_one_object_per_line() {
    let dir = TempDir::new().unwrap();
    let output = idscanctl(&dir)
        .arg("simulate")
        .arg(demo("auto_fallback.json"))
        .args(["--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines[0]["event"], "state_changed");
    assert_eq!(lines[0]["to"], "barcode");
    let last = lines.last().unwrap();
    assert_eq!(last["final"]["state"], "completed");
    assert!(
        lines
            .iter()
            .any(|line| line["event"] == "session_finished"
                && line["outcome"]["outcome"] == "completed")
    );
}

#[test]
fn config_show_reports_source_and_toml() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("idscan.toml"),
        "[fallback]\nbarcode_timeout_ms = 4000\n",
    )
    .unwrap();

    idscanctl(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# source:"))
        .stdout(predicate::str::contains("idscan.toml"))
        .stdout(predicate::str::contains("barcode_timeout_ms = 4000"));
}

#[test]
fn config_check_lists_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tight.toml");
    fs::write(
        &path,
        "[fallback]\nbarcode_timeout_ms = 4500\nmax_fallback_processing_time_ms = 5000\n",
    )
    .unwrap();

    idscanctl(&dir)
        .args(["config", "check", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration OK"))
        .stdout(predicate::str::contains("fallback.barcode_timeout_ms"));

    idscanctl(&dir)
        .args(["config", "check", "--deny-warnings", "--path"])
        .arg(&path)
        .assert()
        .failure();
}

#[test]
fn config_check_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    idscanctl(&dir)
        .args(["config", "check"])
        .env("IDSCAN_MIN_QUALITY", "2.0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_quality_threshold"));
}
