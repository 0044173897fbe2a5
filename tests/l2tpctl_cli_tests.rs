//! Integration tests for l2tpctl
//!
//! Only paths that never touch system files or daemons are exercised here.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

/// l2tpctl with no action inputs inherited from the environment
fn l2tpctl() -> Command {
    let mut cmd = Command::cargo_bin("l2tpctl").unwrap();
    cmd.env_remove("INPUT_SERVER")
        .env_remove("INPUT_USERNAME")
        .env_remove("INPUT_PASSWORD")
        .env_remove("INPUT_PSK")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_command() {
    l2tpctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("L2TP/IPsec"))
        .stdout(predicate::str::contains("connect"))
        .stdout(predicate::str::contains("render"));
}

#[test]
fn test_connect_help_lists_action_inputs() {
    l2tpctl()
        .args(["connect", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("INPUT_SERVER"))
        .stdout(predicate::str::contains("INPUT_PSK"))
        .stdout(predicate::str::contains("--skip-install"));
}

#[test]
fn test_connect_without_inputs_fails() {
    l2tpctl()
        .args(["connect", "--skip-install"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing required input: server"));
}

#[test]
fn test_connect_missing_psk_fails() {
    l2tpctl()
        .args(["connect", "--skip-install"])
        .env("INPUT_SERVER", "203.0.113.5")
        .env("INPUT_USERNAME", "ci-bot")
        .env("INPUT_PASSWORD", "hunter2")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing required input: psk"));
}

#[test]
fn test_render_from_action_inputs() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("l2tp");

    l2tpctl()
        .arg("render")
        .arg("--output-dir")
        .arg(&out)
        .env("INPUT_SERVER", "203.0.113.5")
        .env("INPUT_USERNAME", "ci-bot")
        .env("INPUT_PASSWORD", "hunter2")
        .env("INPUT_PSK", "sharedkey")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 5 files"));

    for name in ["ipsec.conf", "ipsec.secrets", "options.l2tpd.client", "xl2tpd.conf", "resolv.conf.l2tp"] {
        let path = out.join(name);
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "{} has mode {:o}", name, mode);
    }

    let secrets = fs::read_to_string(out.join("ipsec.secrets")).unwrap();
    assert_eq!(secrets, "203.0.113.5 : PSK \"sharedkey\"");

    let ipsec = fs::read_to_string(out.join("ipsec.conf")).unwrap();
    assert!(ipsec.contains("right=203.0.113.5"));
    assert!(ipsec.contains("ike=aes128-sha1-modp2048,aes256-sha1-modp2048,aes256-sha256-modp2048"));

    let xl2tpd = fs::read_to_string(out.join("xl2tpd.conf")).unwrap();
    assert!(xl2tpd.contains("pppoptfile = /etc/ppp/options.l2tpd.client"));
}

#[test]
fn test_render_rejects_quoted_password() {
    let dir = TempDir::new().unwrap();

    l2tpctl()
        .arg("render")
        .arg("--output-dir")
        .arg(dir.path())
        .args(["--server", "vpn.example.com", "--username", "ci", "--psk", "k"])
        .args(["--password", "bad\"pass"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid parameter"));

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_render_uses_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("l2tpctl.toml");
    fs::write(
        &config,
        r#"
[tunnel]
lac_name = "corp"
nameservers = ["9.9.9.9"]
"#,
    )
    .unwrap();
    let out = dir.path().join("out");

    l2tpctl()
        .arg("--config")
        .arg(&config)
        .arg("render")
        .arg("--output-dir")
        .arg(&out)
        .args(["--server", "vpn.example.com", "--username", "ci", "--password", "p", "--psk", "k"])
        .assert()
        .success();

    let xl2tpd = fs::read_to_string(out.join("xl2tpd.conf")).unwrap();
    assert!(xl2tpd.starts_with("[lac corp]\n"));
    assert_eq!(fs::read_to_string(out.join("resolv.conf.l2tp")).unwrap(), "nameserver 9.9.9.9\n");
}

#[test]
fn test_invalid_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("broken.toml");
    fs::write(&config, "elevation = [").unwrap();

    l2tpctl()
        .arg("--config")
        .arg(&config)
        .args(["render", "--output-dir"])
        .arg(dir.path().join("out"))
        .args(["--server", "vpn.example.com", "--username", "ci", "--password", "p", "--psk", "k"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
