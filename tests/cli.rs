use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn write_config(dir: &Path, extra: &str) {
    let session = dir.join("session.json");
    let yaml = format!(
        r#"api:
  environment: local
  production_url: https://api.example.com
  local_url: http://127.0.0.1:9
  api_key: null
  request_timeout_secs: 5
  health_timeout_secs: 1
app:
  session_file: {}
  default_output_format: text
  default_language: null
{}"#,
        session.display(),
        extra
    );
    std::fs::write(dir.join("config.yaml"), yaml).unwrap();
}

fn transcriptor(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("transcriptor").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("TRANSCRIPT_API_KEY")
        .env_remove("TRANSCRIPT_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    transcriptor(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("health"));
}

#[test]
fn test_config_show_reads_local_file() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "");

    transcriptor(&dir)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Environment: local"))
        .stdout(predicate::str::contains("http://127.0.0.1:9"))
        .stdout(predicate::str::contains("API Key: not set"));
}

#[test]
fn test_api_key_from_environment() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "");

    transcriptor(&dir)
        .env("TRANSCRIPT_API_KEY", "secret")
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("API Key: configured"))
        .stdout(predicate::str::contains("secret").not());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "retry:\n  factor: 0\n");

    transcriptor(&dir)
        .args(["config", "--show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("retry.factor"));
}

#[test]
fn test_extract_rejects_non_http_url_offline() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "");

    transcriptor(&dir)
        .args(["--quiet", "extract", "ftp://example.com/video"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HTTP or HTTPS"));
}

#[test]
fn test_whoami_without_session() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "");

    transcriptor(&dir)
        .args(["--quiet", "whoami"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not logged in"));
}

#[test]
fn test_logout_without_session_succeeds() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "");

    transcriptor(&dir)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));
    assert!(!dir.path().join("session.json").exists());
}
