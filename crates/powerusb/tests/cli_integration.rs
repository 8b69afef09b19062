//! Integration tests for the `powerusb` binary.
//!
//! These run the binary via `assert_cmd`. Commands that need a strip
//! attached are only exercised through `--help` and argument validation.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn cli() -> assert_cmd::Command {
    cargo_bin_cmd!("powerusb")
}

#[test]
fn cli_help_succeeds() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("powerusb"))
        .stdout(predicate::str::contains("socket"))
        .stdout(predicate::str::contains("meter"));
}

#[test]
fn cli_version_prints_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_without_subcommand_fails() {
    cli().assert().failure();
}

#[test]
fn cli_config_json_produces_valid_json() {
    let output = cli()
        .args(["--json", "config"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value =
        serde_json::from_slice(&output).expect("config --json should produce valid JSON");
    assert!(
        json["settings"].is_object(),
        "JSON output should contain 'settings' object"
    );
    assert!(
        json["config_file"].is_string() || json["config_file"].is_null(),
        "config_file should be string or null"
    );
    assert!(json["settings"]["settle_delay_ms"].is_u64());
}

#[test]
fn cli_config_reads_custom_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("powerusb.toml");
    std::fs::write(
        &path,
        "settle_delay_ms = 40\n\n[labels]\n\"usb:1/004\" = \"rack\"\n",
    )
    .unwrap();

    cli()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("(loaded)"))
        .stdout(predicate::str::contains("usb:1/004 = rack"))
        .stdout(predicate::str::contains("40"));
}

#[test]
fn cli_config_json_reports_custom_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("powerusb.toml");
    std::fs::write(&path, "read_timeout_ms = 0\n").unwrap();

    let output = cli()
        .args(["--json", "--config"])
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(json["config_file_exists"], true);
    assert_eq!(json["settings"]["read_timeout_ms"], 0);
    assert_eq!(json["problems"].as_array().unwrap().len(), 1);
}

#[test]
fn cli_config_init_writes_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("powerusb.toml");

    cli()
        .arg("--config")
        .arg(&path)
        .args(["config", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    let body = std::fs::read_to_string(&path).unwrap();
    assert!(body.contains("settle_delay_ms = 20"));

    cli()
        .arg("--config")
        .arg(&path)
        .args(["config", "--init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    cli()
        .arg("--config")
        .arg(&path)
        .args(["config", "--init", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Replaced"));
}

#[test]
fn cli_config_force_requires_init() {
    cli().args(["config", "--force"]).assert().failure();
}

// ── --verbose flag ──

#[test]
fn cli_verbose_flag_accepted() {
    cli().args(["-v", "config"]).assert().success();
}

#[test]
fn cli_verbose_long_flag_accepted() {
    cli().args(["--verbose", "config"]).assert().success();
}

// ── Argument validation (fails before any USB access) ──

#[test]
fn cli_socket_requires_a_socket_argument() {
    cli().arg("socket").assert().failure();
}

#[test]
fn cli_socket_rejects_out_of_range_socket() {
    cli()
        .args(["socket", "1:4", "--on"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid socket 4"));
}

#[test]
fn cli_socket_rejects_spec_without_socket() {
    cli()
        .args(["socket", "rack", "--on"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("<strip>:<socket>"));
}

#[test]
fn cli_socket_on_and_off_conflict() {
    cli()
        .args(["socket", "1:1", "--on", "--off"])
        .assert()
        .failure();
}

#[test]
fn cli_meter_cumulative_and_reset_conflict() {
    cli()
        .args(["meter", "1", "--cumulative", "--reset"])
        .assert()
        .failure();
}

#[test]
fn cli_strip_selector_zero_rejected() {
    cli()
        .args(["status", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 or greater"));
}

#[test]
fn cli_watch_count_zero_rejected() {
    cli()
        .args(["watch", "1", "--count", "0"])
        .assert()
        .failure();
}

#[test]
fn cli_watch_interval_zero_rejected_as_argument() {
    cli()
        .args(["watch", "1", "--interval", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("positive"))
        .stderr(predicate::str::contains("Config error").not());
}

#[test]
fn cli_watch_interval_must_be_numeric() {
    cli()
        .args(["watch", "1", "--interval", "soon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a number"));
}

// ── Subcommand help ──

#[test]
fn cli_strips_help_succeeds() {
    cli()
        .args(["strips", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("List connected"));
}

#[test]
fn cli_status_help_succeeds() {
    cli().args(["status", "--help"]).assert().success();
}

#[test]
fn cli_socket_help_succeeds() {
    cli()
        .args(["socket", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--default"));
}

#[test]
fn cli_meter_help_succeeds() {
    cli()
        .args(["meter", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--cumulative"));
}

#[test]
fn cli_strip_help_lists_actions() {
    cli()
        .args(["strip", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("all-on"))
        .stdout(predicate::str::contains("current-offset"));
}

#[test]
fn cli_watch_help_succeeds() {
    cli()
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--interval"));
}
