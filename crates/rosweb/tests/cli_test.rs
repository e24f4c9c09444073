//! Integration tests for the `rosweb` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! config handling and error exit codes, all without a live rosbridge.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `rosweb` binary with env isolation.
///
/// Clears all `ROSWEB_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn rosweb_cmd() -> assert_cmd::Command {
    config_cmd(Path::new("/tmp/rosweb-cli-test-nonexistent"))
}

/// Same isolation, with config rooted at `dir`.
fn config_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("rosweb");
    cmd.env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir)
        .env_remove("ROSWEB_PROFILE")
        .env_remove("ROSWEB_ENDPOINT")
        .env_remove("ROSWEB_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = rosweb_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    rosweb_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("rosbridge")
            .and(predicate::str::contains("echo"))
            .and(predicate::str::contains("publish"))
            .and(predicate::str::contains("slide"))
            .and(predicate::str::contains("topics")),
    );
}

#[test]
fn test_version_flag() {
    rosweb_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rosweb"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    rosweb_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    rosweb_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Validation before connecting ────────────────────────────────────

#[test]
fn test_slide_out_of_range_fails_without_connecting() {
    // Unreachable endpoint: a connection attempt would exit 7, not 2.
    rosweb_cmd()
        .args(["--endpoint", "ws://127.0.0.1:1", "slide", "101"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("outside"));
}

#[test]
fn test_slide_negative_value_is_out_of_range() {
    rosweb_cmd()
        .args(["--endpoint", "ws://127.0.0.1:1", "slide", "-5"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("outside"));
}

#[test]
fn test_slide_dry_run_prints_motion_command() {
    rosweb_cmd()
        .args(["slide", "50", "--dry-run"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("servo_id")
                .and(predicate::str::contains("500"))
                .and(predicate::str::contains("1000")),
        );
}

#[test]
fn test_publish_rejects_invalid_json() {
    rosweb_cmd()
        .args([
            "--endpoint",
            "ws://127.0.0.1:1",
            "publish",
            "/chatter",
            "std_msgs/String",
            "not json",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("JSON"));
}

#[test]
fn test_publish_rejects_non_object_payload() {
    rosweb_cmd()
        .args([
            "--endpoint",
            "ws://127.0.0.1:1",
            "publish",
            "/chatter",
            "std_msgs/String",
            "[1,2]",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("object"));
}

#[test]
fn test_non_websocket_endpoint_is_rejected() {
    rosweb_cmd()
        .args(["--endpoint", "http://robot.local:9090", "status"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ws://"));
}

#[test]
fn test_echo_zero_count_exits_immediately() {
    rosweb_cmd()
        .args(["--endpoint", "ws://127.0.0.1:1", "echo", "/chatter", "-n", "0"])
        .assert()
        .success();
}

// ── Connection failures ─────────────────────────────────────────────

#[test]
fn test_status_unreachable_broker_exits_with_connection_code() {
    rosweb_cmd()
        .args(["--endpoint", "ws://127.0.0.1:1", "--timeout", "5", "status"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("127.0.0.1:1"));
}

#[test]
fn test_unknown_profile_exits_not_found() {
    rosweb_cmd()
        .args(["--profile", "lab", "status"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("lab"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_prints_location() {
    rosweb_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_no_config() {
    // A missing file renders the defaults.
    rosweb_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default_profile"));
}

#[test]
fn test_config_init_then_profiles() {
    let dir = tempfile::tempdir().unwrap();

    config_cmd(dir.path())
        .args(["--endpoint", "ws://robot.local:9090", "config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    config_cmd(dir.path())
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* default  ws://robot.local:9090"));

    config_cmd(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ws://robot.local:9090"));
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();

    config_cmd(dir.path()).args(["config", "init"]).assert().success();
    config_cmd(dir.path())
        .args(["config", "init"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("--force"));
    config_cmd(dir.path())
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_use_unknown_profile() {
    let dir = tempfile::tempdir().unwrap();

    config_cmd(dir.path()).args(["config", "init"]).assert().success();
    config_cmd(dir.path())
        .args(["config", "use", "lab"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("default"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = rosweb_cmd().arg("foobar").output().unwrap();
    assert!(
        !output.status.success(),
        "Expected failure for invalid subcommand"
    );
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_config_subcommands_exist() {
    rosweb_cmd()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("init")
                .and(predicate::str::contains("show"))
                .and(predicate::str::contains("profiles")),
        );
}
