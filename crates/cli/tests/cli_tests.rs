//! CLI integration tests
//!
//! Everything here must run offline: no fixture relies on a reachable
//! model backend or external site.

use predicates::prelude::*;

fn cmd() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("distill").unwrap()
}

#[test]
fn test_help_shows_usage() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("URL"))
        .stdout(predicate::str::contains("--complexity"));
}

#[test]
fn test_version_flag() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_missing_url_is_an_error() {
    cmd().assert().failure().stderr(predicate::str::contains("URL"));
}

#[test]
fn test_invalid_url_fails_before_any_network() {
    cmd()
        .args(["not a url", "--no-stream"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("无效的URL格式"));
}

#[test]
fn test_invalid_complexity_rejected() {
    cmd()
        .args(["https://example.com", "--complexity", "expert"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("beginner"));
}

#[test]
fn test_models_listing_needs_no_url() {
    cmd()
        .arg("--models")
        .assert()
        .success()
        .stdout(predicate::str::contains("grok3-mini"))
        .stdout(predicate::str::contains("qwen-turbo"))
        .stdout(predicate::str::contains("openai-gpt4"));
}

#[test]
fn test_models_listing_respects_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("models.json"),
        serde_json::json!({
            "priority": ["qwen-turbo"],
            "settings": {"openai-gpt4": {"enabled": false}}
        })
        .to_string(),
    )
    .unwrap();

    cmd()
        .args(["--models", "--config-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"));
}
