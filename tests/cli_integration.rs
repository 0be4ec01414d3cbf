// CLI integration tests for local note flows, exit codes, and demos.
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_notekeep");
    let mut command = Command::new(exe);
    command.env_remove("NOTEKEEP_DB_URL");
    command
}

fn run_with_db(db: &Path, args: &[&str]) -> Output {
    cmd()
        .arg("--db")
        .arg(db)
        .args(args)
        .output()
        .expect("run notekeep")
}

fn parse_json(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().next().expect("json line");
    serde_json::from_str(line).expect("valid json")
}

#[test]
fn add_list_get_delete_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");

    let add = run_with_db(&db, &["note", "add", "First note from the backend!"]);
    assert!(add.status.success());
    let created = parse_json(&add.stdout);
    assert_eq!(created["text"], "First note from the backend!");
    let id = created["id"].as_str().expect("object id").to_string();
    assert_eq!(id.len(), 24);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

    let list = run_with_db(&db, &["note", "list"]);
    assert!(list.status.success());
    let listed = parse_json(&list.stdout);
    assert_eq!(listed.as_array().expect("array").len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());

    let get = run_with_db(&db, &["note", "get", &id]);
    assert!(get.status.success());
    assert_eq!(parse_json(&get.stdout), created);

    let delete = run_with_db(&db, &["note", "delete", &id]);
    assert!(delete.status.success());
    let deleted = parse_json(&delete.stdout);
    assert_eq!(
        deleted["message"],
        format!("Note with id {id} has been deleted")
    );
    assert_eq!(deleted["deleted_note"], created);

    let list = run_with_db(&db, &["note", "list"]);
    assert_eq!(parse_json(&list.stdout), Value::Array(Vec::new()));
}

#[test]
fn collection_file_holds_documents_with_object_ids() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");

    let add = run_with_db(&db, &["note", "add", "persisted"]);
    assert!(add.status.success());

    let raw = std::fs::read_to_string(db.join("notes.json")).expect("collection file");
    let docs: Value = serde_json::from_str(&raw).expect("collection json");
    assert_eq!(docs[0]["text"], "persisted");
    assert!(docs[0]["_id"].is_string());
}

#[test]
fn missing_note_exits_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");

    let get = run_with_db(&db, &["note", "get", "0123456789abcdef01234567"]);
    assert_eq!(get.status.code(), Some(3));
    let err = parse_json(&get.stderr);
    assert_eq!(err["error"]["kind"], "NotFound");

    let delete = run_with_db(&db, &["note", "delete", "7"]);
    assert_eq!(delete.status.code(), Some(3));
}

#[test]
fn unsupported_connection_scheme_is_usage_error() {
    let output = cmd()
        .args(["--db", "mongodb://localhost:27017", "note", "list"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(2));
    let err = parse_json(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(err["error"]["hint"].is_string());
}

#[test]
fn env_connection_string_is_used_without_flag() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("from-env");

    let add = cmd()
        .env("NOTEKEEP_DB_URL", &db)
        .args(["note", "add", "via env"])
        .output()
        .expect("run");
    assert!(add.status.success());
    assert!(db.join("notes.json").exists());
}

#[test]
fn corrupt_collection_exits_corrupt() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");
    std::fs::create_dir_all(&db).expect("mkdir");
    std::fs::write(db.join("notes.json"), "{ not json").expect("write");

    let list = run_with_db(&db, &["note", "list"]);
    assert_eq!(list.status.code(), Some(7));
    let err = parse_json(&list.stderr);
    assert_eq!(err["error"]["kind"], "Corrupt");
    assert!(err["error"]["path"].as_str().expect("path").ends_with("notes.json"));
}

#[test]
fn remote_tls_flags_require_url() {
    let temp = tempfile::tempdir().expect("tempdir");
    let db = temp.path().join("db");

    let list = run_with_db(&db, &["note", "list", "--tls-skip-verify"]);
    assert_eq!(list.status.code(), Some(2));
    let err = parse_json(&list.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(!db.exists());
}

#[test]
fn missing_arguments_are_usage_errors() {
    let output = cmd().args(["note", "add"]).output().expect("run");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn demo_gears_reports_ratio_and_torque() {
    let output = cmd().args(["demo", "gears"]).output().expect("run");
    assert!(output.status.success());
    let report = parse_json(&output.stdout);
    assert_eq!(report["samples"], 500);
    assert!((report["ratio"].as_f64().expect("ratio") - 0.5).abs() < 1e-12);
    assert!((report["driven_speed_max"].as_f64().expect("speed") - 50.0).abs() < 1e-9);
    assert!((report["driven_torque"].as_f64().expect("torque") - 10.0).abs() < 1e-12);
}

#[test]
fn demo_gears_rejects_bad_radius() {
    let output = cmd()
        .args(["demo", "gears", "--driver-radius", "0"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn demo_fatigue_strategies_agree() {
    let output = cmd()
        .args(["demo", "fatigue", "--samples", "20000", "--runs", "1"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let report = parse_json(&output.stdout);
    let looped = report["damage_loop"].as_f64().expect("loop");
    let vectorized = report["damage_vectorized"].as_f64().expect("vectorized");
    assert!(looped > 0.0);
    assert!(((looped - vectorized) / looped).abs() < 1e-9);
}

#[test]
fn version_emits_json_when_piped() {
    let output = cmd().arg("version").output().expect("run");
    assert!(output.status.success());
    let value = parse_json(&output.stdout);
    assert_eq!(value["name"], "notekeep");
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}
