//! End-to-end tests for the roster binary.

use assert_cmd::Command;
use std::path::Path;
use tempfile::TempDir;

fn roster(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("roster").unwrap();
    cmd.env_remove("ROSTER_DB")
        .env_remove("RUST_LOG")
        .arg("--db")
        .arg(db)
        .arg("--json");
    cmd
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).unwrap();
    serde_json::from_str(text.trim()).unwrap()
}

fn stderr_json(output: &[u8]) -> serde_json::Value {
    let text = String::from_utf8(output.to_vec()).unwrap();
    let line = text.lines().last().unwrap();
    serde_json::from_str(line).unwrap()
}

#[test]
fn test_add_list_update_delete() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("roster.db");

    let added = stdout_json(roster(&db).args(["add", "Harry", "--age", "30"]));
    assert_eq!(added["name"], "Harry");
    assert_eq!(added["age"], 30);
    assert_eq!(added["house"], "gryffindor");
    let id = added["id"].as_i64().unwrap();

    stdout_json(roster(&db).args(["add", "Luna", "--age", "17", "--house", "Ravenclaw"]));

    let listed = stdout_json(roster(&db).arg("list"));
    assert_eq!(listed["count"], 2);
    assert_eq!(listed["people"][0]["name"], "Harry");
    assert_eq!(listed["people"][1]["house"], "ravenclaw");

    let updated = stdout_json(roster(&db).args(["set-age", &id.to_string(), "31"]));
    assert_eq!(updated["age"], 31);

    let shown = stdout_json(roster(&db).args(["show", &id.to_string()]));
    assert_eq!(shown["age"], 31);

    let deleted = stdout_json(roster(&db).args(["delete", &id.to_string()]));
    assert_eq!(deleted["deleted"], true);

    let listed = stdout_json(roster(&db).arg("list"));
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["people"][0]["name"], "Luna");
}

#[test]
fn test_list_filters() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("roster.db");

    stdout_json(roster(&db).args(["add", "Harry", "--age", "30"]));
    stdout_json(roster(&db).args(["add", "Draco", "--age", "12", "--house", "slytherin"]));

    let slytherin = stdout_json(roster(&db).args(["list", "--house", "slytherin"]));
    assert_eq!(slytherin["count"], 1);
    assert_eq!(slytherin["people"][0]["name"], "Draco");

    let older = stdout_json(roster(&db).args(["list", "--older-than", "20"]));
    assert_eq!(older["count"], 1);
    assert_eq!(older["people"][0]["name"], "Harry");
}

#[test]
fn test_unknown_id_exits_not_found() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("roster.db");

    for args in [["delete", "99", ""], ["set-age", "99", "40"], ["show", "99", ""]] {
        let args: Vec<&str> = args.into_iter().filter(|a| !a.is_empty()).collect();
        let output = roster(&db).args(&args).assert().code(3).get_output().stderr.clone();
        let error = stderr_json(&output);
        assert_eq!(error["error"]["code"], "RECORD_NOT_FOUND");
        assert!(error["error"]["hint"].is_string());
    }
}

#[test]
fn test_add_rejects_blank_name() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("roster.db");

    let output = roster(&db).args(["add", "   "]).assert().code(4).get_output().stderr.clone();
    assert_eq!(stderr_json(&output)["error"]["code"], "INVALID_ARGUMENT");
}

#[test]
fn test_migrate_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("roster.db");

    let first = stdout_json(roster(&db).arg("migrate"));
    assert_eq!(first["applied"], serde_json::json!(["Create people", "Add house"]));
    assert_eq!(first["skipped"], 0);

    let second = stdout_json(roster(&db).arg("migrate"));
    assert_eq!(second["applied"], serde_json::json!([]));
    assert_eq!(second["skipped"], 2);
}

#[test]
fn test_watch_prints_snapshot_and_exits() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("roster.db");
    stdout_json(roster(&db).args(["add", "Hermione", "--age", "19"]));

    let output = roster(&db)
        .args(["watch", "--seconds", "0"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();
    let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(first["people"][0]["name"], "Hermione");
}

#[test]
fn test_watch_prints_changes_from_stdin() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("roster.db");
    let added = stdout_json(roster(&db).args(["add", "Hermione", "--age", "19"]));
    let id = added["id"].as_i64().unwrap();

    let assert = roster(&db)
        .arg("watch")
        .write_stdin(format!("add Ron 18 gryffindor\nset-age {id} 20\nfly away\ndelete {id}\n"))
        .assert()
        .success();
    let output = assert.get_output();

    let prints: Vec<serde_json::Value> = String::from_utf8(output.stdout.clone())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert!(prints.len() >= 2, "expected a print after the snapshot: {prints:?}");
    assert_eq!(prints[0]["count"], 1);
    assert_eq!(prints[0]["people"][0]["name"], "Hermione");

    let last = prints.last().unwrap();
    assert_eq!(last["count"], 1);
    assert_eq!(last["people"][0]["name"], "Ron");

    let stderr = String::from_utf8(output.stderr.clone()).unwrap();
    assert!(stderr.contains("INVALID_ARGUMENT"));

    // The writes went to the store, not just the printed view
    let listed = stdout_json(roster(&db).arg("list"));
    assert_eq!(listed["people"][0]["name"], "Ron");
}

#[test]
fn test_version_lists_migrations() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("roster.db");

    let version = stdout_json(roster(&db).arg("version"));
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(version["migrations"], serde_json::json!(["Create people", "Add house"]));
}
