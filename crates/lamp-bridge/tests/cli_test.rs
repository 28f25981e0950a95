//! Integration tests for the `lamp-bridge` binary.
//!
//! Argument parsing, config subcommands, and startup errors; none of
//! them need a gateway.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command with env isolation: no `LAMP_*` overrides, and a
/// HOME that does not exist.
fn lamp_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("lamp-bridge");
    cmd.env("HOME", "/tmp/lamp-bridge-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/lamp-bridge-test-nonexistent")
        .env_remove("LAMP_CONFIG")
        .env_remove("LAMP_LISTEN")
        .env_remove("LAMP_INSECURE")
        .env_remove("RUST_LOG");
    cmd
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = lamp_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains("Usage"), "{text}");
}

#[test]
fn test_help_flag() {
    lamp_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("EG2-S")
            .and(predicate::str::contains("serve"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    lamp_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lamp-bridge"));
}

#[test]
fn test_bad_listen_address_is_usage_error() {
    lamp_cmd()
        .args(["serve", "--listen", "not-an-address"])
        .assert()
        .code(2);
}

// ── Config subcommands ──────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    lamp_cmd()
        .args(["--config", "/tmp/somewhere/lamp.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/somewhere/lamp.toml"));
}

#[test]
fn test_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    lamp_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(path.exists());

    lamp_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("listen = \"0.0.0.0:8080\"")
                .and(predicate::str::contains("query_timeout_secs = 5")),
        );
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "listen = \"127.0.0.1:1\"\n").unwrap();

    lamp_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_config_show_hides_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[gateway]
host = "10.0.0.5"
username = "admin"
password = "hunter2"
notify_host = "ha.local"
notify_token = "webhook-secret"
channels = 2
"#,
    )
    .unwrap();

    lamp_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("10.0.0.5")
                .and(predicate::str::contains("hunter2").not())
                .and(predicate::str::contains("webhook-secret").not()),
        );
}

#[test]
fn test_invalid_config_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "listen = \"nowhere\"\n").unwrap();

    lamp_cmd()
        .arg("--config")
        .arg(&path)
        .arg("serve")
        .assert()
        .code(3);
}
