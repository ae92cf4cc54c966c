use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn chatsync(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("chatsync").unwrap();
    cmd.env("CHATSYNC_ROOT", root)
        .env_remove("CHATSYNC_CONFIG")
        .env_remove("CHATSYNC_REMOTE_URL")
        .env_remove("CHATSYNC_SENDER")
        .env("HOME", root)
        .env("XDG_CONFIG_HOME", root.join("xdg"));
    cmd
}

fn robot_json(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("chatsync").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("chatsync").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_init_creates_layout() {
    let dir = tempdir().unwrap();
    let json = robot_json(chatsync(dir.path()).args(["--robot", "init"]));
    assert_eq!(json["status"], "ok");
    assert_eq!(json["replica_commits"], 0);
    assert!(dir.path().join("config.toml").exists());
    assert!(dir.path().join("database/messages.db").exists());
    assert!(dir.path().join("replica/.git").exists());
}

#[test]
fn test_post_then_list_robot() {
    let dir = tempdir().unwrap();
    chatsync(dir.path()).args(["-q", "init"]).assert().success();

    for text in ["first", "second"] {
        let json = robot_json(chatsync(dir.path()).args([
            "--robot", "-q", "post", "--sender", "alice", text,
        ]));
        assert_eq!(json["sync_status"], "synchronized");
        assert!(json["commit_ref"].is_string());
    }

    let json = robot_json(chatsync(dir.path()).args(["--robot", "-q", "list", "--limit", "10"]));
    let items = json.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], 2);
    assert_eq!(items[0]["content"], "second");
    assert_eq!(items[1]["id"], 1);
}

#[test]
fn test_post_reads_stdin() {
    let dir = tempdir().unwrap();
    let json = robot_json(
        chatsync(dir.path())
            .args(["--robot", "-q", "post", "--sender", "bob"])
            .write_stdin("from stdin\n"),
    );
    assert_eq!(json["content"], "from stdin\n");
}

#[test]
fn test_post_rejects_blank_content() {
    let dir = tempdir().unwrap();
    chatsync(dir.path())
        .args(["-q", "post", "--sender", "alice", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("content must not be empty"));
}

#[test]
fn test_status_and_reconcile_robot() {
    let dir = tempdir().unwrap();
    chatsync(dir.path())
        .args(["-q", "post", "--sender", "carol", "hello"])
        .assert()
        .success();

    let report = robot_json(chatsync(dir.path()).args(["--robot", "-q", "reconcile"]));
    assert_eq!(report["advanced"], 0);
    assert_eq!(report["skipped"], false);

    let status = robot_json(chatsync(dir.path()).args(["--robot", "-q", "status"]));
    assert_eq!(status["messages"]["synchronized"], 1);
    assert_eq!(status["replica_commits"], 1);
    assert_eq!(status["integrity_ok"], true);
    assert!(status["latest_commit"].is_string());
    assert!(status["latest_pushed"].is_null());

    let diag = robot_json(chatsync(dir.path()).args(["--robot", "-q", "status", "--id", "1"]));
    assert_eq!(diag["attempts"], 1);
}

#[test]
fn test_status_unknown_id_fails_with_json_error() {
    let dir = tempdir().unwrap();
    chatsync(dir.path())
        .args(["--robot", "-q", "status", "--id", "42"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\":404"));
}

#[test]
fn test_human_list_output() {
    let dir = tempdir().unwrap();
    chatsync(dir.path())
        .args(["-q", "post", "--sender", "dave", "hi there"])
        .assert()
        .success();
    chatsync(dir.path())
        .args(["-q", "list"])
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("dave"))
        .stdout(predicate::str::contains("hi there"));
}
