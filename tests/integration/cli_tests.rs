//! Integration tests for the CLI binary.
//!
//! This test is registered as a [[test]] in the did-agent-cli crate
//! so that CARGO_BIN_EXE_didagent is available.

use std::path::Path;
use std::process::{Command, Output};

const SECRET: &str = "7782ce53bb2c41342b30f0ca15df8e45188e4046094c06cb46179efde1d1b67b";

/// Get a Command pointing to the `didagent` binary.
fn didagent() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_didagent"));
    cmd.env_remove("DID_AGENT_SECRET_KEY")
        .env_remove("DID_AGENT_HOME");
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    didagent()
        .arg("--home")
        .arg(home)
        .args(args)
        .env("DID_AGENT_SECRET_KEY", SECRET)
        .output()
        .expect("failed to execute didagent")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "didagent failed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn cli_responds_to_help() {
    let output = didagent().arg("--help").output().unwrap();
    let out = stdout(&output);
    assert!(out.contains("Usage") || out.contains("didagent"), "got: {out}");
}

#[test]
fn cli_responds_to_version() {
    let output = didagent().arg("--version").output().unwrap();
    assert!(stdout(&output).contains("0.1"));
}

#[test]
fn cli_exits_with_error_on_unknown_flag() {
    let output = didagent().arg("--nonexistent-flag").output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn generate_secret_prints_vault_key() {
    let output = didagent().arg("generate-secret").output().unwrap();
    let secret = stdout(&output).trim().to_string();
    assert_eq!(secret.len(), 64);
    assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn missing_secret_is_reported() {
    let home = tempfile::tempdir().unwrap();
    let output = didagent()
        .arg("--home")
        .arg(home.path())
        .arg("list")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("DID_AGENT_SECRET_KEY"));
}

#[test]
fn create_resolve_sign_delete() {
    let home = tempfile::tempdir().unwrap();

    let created: serde_json::Value =
        serde_json::from_str(&stdout(&run(home.path(), &["create", "--alias", "alice"]))).unwrap();
    let did = created["did"].as_str().unwrap().to_string();
    assert!(did.starts_with("did:web:localhost:"));
    assert!(home.path().join("web").exists());

    let listed = stdout(&run(home.path(), &["list"]));
    assert!(listed.contains(&did));
    assert!(listed.contains("alice"));

    let document: serde_json::Value =
        serde_json::from_str(&stdout(&run(home.path(), &["resolve", &did]))).unwrap();
    assert_eq!(document["id"], did.as_str());

    let signature = stdout(&run(home.path(), &["sign", "hello", "--did", &did]));
    assert!(!signature.trim().is_empty());
    assert!(hex_like(signature.trim()));

    let keys = stdout(&run(home.path(), &["keys"]));
    assert!(keys.contains(created["controllerKeyId"].as_str().unwrap()));

    stdout(&run(home.path(), &["delete", &did]));
    let listed = stdout(&run(home.path(), &["list"]));
    assert!(!listed.contains(&did));
    let listed = stdout(&run(home.path(), &["list", "--all"]));
    assert!(listed.contains("revoked"));

    let output = run(home.path(), &["resolve", &did]);
    assert!(!output.status.success());
}

#[test]
fn duplicate_alias_fails() {
    let home = tempfile::tempdir().unwrap();
    stdout(&run(home.path(), &["create", "--alias", "bob"]));
    let output = run(home.path(), &["create", "--alias", "bob"]);
    assert!(!output.status.success());
}

fn hex_like(s: &str) -> bool {
    s.len() % 2 == 0 && s.chars().all(|c| c.is_ascii_hexdigit())
}
