//! End-to-end tests driving the `est` binary against a temporary database.
//!
//! Covers the planning flow: add → allocate → pin → split → merge →
//! undo/redo → export → import.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn est_binary() -> String {
    env!("CARGO_BIN_EXE_est").to_string()
}

/// Runs `est` with today fixed to Monday 2025-01-06 and an isolated home.
fn est(home: &Path, db: &Path, args: &[&str]) -> Output {
    Command::new(est_binary())
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env("EST_DATABASE_PATH", db)
        .env_remove("RUST_LOG")
        .args(["--today", "2025-01-06"])
        .args(args)
        .output()
        .expect("failed to run est")
}

/// Runs `est` and returns stdout, failing the test on a non-zero exit.
fn est_ok(home: &Path, db: &Path, args: &[&str]) -> String {
    let output = est(home, db, args);
    assert!(
        output.status.success(),
        "est {args:?} should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn est_json(home: &Path, db: &Path, args: &[&str]) -> Value {
    serde_json::from_str(&est_ok(home, db, args)).expect("output should be JSON")
}

/// `(date, minutes, kind)` of every allocation entry of an estimate.
fn allocations(home: &Path, db: &Path, id: &str) -> Vec<(String, i64, String)> {
    let detail = est_json(home, db, &["show", id, "--json"]);
    detail["allocations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            (
                entry["date"].as_str().unwrap().to_string(),
                entry["amount"].as_i64().unwrap(),
                entry["kind"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

fn alloc(date: &str, minutes: i64, kind: &str) -> (String, i64, String) {
    (date.to_string(), minutes, kind.to_string())
}

struct Env {
    _temp: TempDir,
    home: PathBuf,
    db: PathBuf,
}

fn setup() -> Env {
    let temp = TempDir::new().unwrap();
    let home = temp.path().to_path_buf();
    let db = home.join("data/est.db");
    Env {
        _temp: temp,
        home,
        db,
    }
}

#[test]
fn test_no_subcommand_prints_help() {
    let env = setup();
    let output = est(&env.home, &env.db, &[]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage"));
    assert!(!env.db.exists(), "help should not create a database");
}

#[test]
fn test_planning_flow() {
    let env = setup();
    let (home, db) = (env.home.as_path(), env.db.as_path());

    // Add: 10h fills Monday and spills 2h into Tuesday.
    let added = est_ok(home, db, &["estimate", "add", "Design doc", "10h"]);
    assert!(added.starts_with("Added estimate "), "got: {added}");
    let list = est_json(home, db, &["estimate", "list", "--json"]);
    let id = list[0]["id"].as_str().unwrap().to_string();
    assert_eq!(list[0]["total"], 600);
    assert_eq!(
        allocations(home, db, &id),
        vec![
            alloc("2025-01-06", 480, "auto"),
            alloc("2025-01-07", 120, "auto")
        ]
    );

    // Re-allocating an already placed estimate changes nothing.
    let allocated = est_ok(home, db, &["allocate", &id]);
    assert_eq!(allocated, format!("Allocated {}\n", &id[..8]));
    assert_eq!(allocations(home, db, &id).len(), 2);

    let grid = est_ok(home, db, &["grid", "--days", "2"]);
    assert!(grid.contains("GRID 2025-01-06 to 2025-01-07"), "got: {grid}");
    assert!(grid.contains("Design doc"));

    // Pin: Tuesday takes 5h, Monday keeps the rest.
    let pinned = est_ok(home, db, &["pin", &id[..8], "2025-01-07", "5h"]);
    assert!(pinned.starts_with("Pinned 5h of "), "got: {pinned}");
    assert_eq!(
        allocations(home, db, &id),
        vec![
            alloc("2025-01-06", 300, "auto"),
            alloc("2025-01-07", 300, "manual")
        ]
    );

    // Pinning more than a day holds fails without --clamp.
    let too_much = est(home, db, &["pin", &id, "2025-01-08", "9h"]);
    assert!(!too_much.status.success());
    let clamped = est_ok(home, db, &["pin", &id, "2025-01-08", "9h", "--clamp"]);
    assert!(clamped.contains("(clamped from 9h)"), "got: {clamped}");
    assert!(est_ok(home, db, &["undo"]).starts_with("Undid: pin 9h"));

    // Split: 2h moves to a child estimate.
    let split = est_ok(home, db, &["split", &id, "2h"]);
    assert!(split.starts_with("Split 2h off "), "got: {split}");
    let list = est_json(home, db, &["estimate", "list", "--json"]);
    assert_eq!(list.as_array().unwrap().len(), 2);
    assert_eq!(list[0]["total"], 480);
    assert_eq!(list[1]["title"], "Design doc (split)");
    assert_eq!(list[1]["total"], 120);
    assert_eq!(list[1]["parent_id"], id.as_str());
    let child = list[1]["id"].as_str().unwrap().to_string();
    assert_eq!(
        allocations(home, db, &child),
        vec![alloc("2025-01-06", 120, "auto")]
    );

    // Merge: the child folds back in and the pin survives.
    est_ok(home, db, &["merge", &id, &child]);
    let list = est_json(home, db, &["estimate", "list", "--json"]);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["total"], 600);
    assert_eq!(
        allocations(home, db, &id),
        vec![
            alloc("2025-01-06", 300, "auto"),
            alloc("2025-01-07", 300, "manual")
        ]
    );

    // Undo and redo survive process restarts.
    let undone = est_ok(home, db, &["undo"]);
    assert!(undone.starts_with("Undid: merge "), "got: {undone}");
    let list = est_json(home, db, &["estimate", "list", "--json"]);
    assert_eq!(list.as_array().unwrap().len(), 2);

    let redone = est_ok(home, db, &["redo"]);
    assert!(redone.starts_with("Redid: merge "), "got: {redone}");
    let list = est_json(home, db, &["estimate", "list", "--json"]);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(est_ok(home, db, &["redo"]), "Nothing to redo.\n");

    let history = est_json(home, db, &["history", "--json"]);
    let labels: Vec<&str> = history["undo"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels.len(), 5);
    assert!(labels[0].starts_with("add estimate \"Design doc\""));
    assert!(labels[1].starts_with("allocate "));
    assert!(labels[4].starts_with("merge "));

    // Export, then import into a fresh database.
    let exported = est_ok(home, db, &["export"]);
    let export_path = home.join("state.json");
    std::fs::write(&export_path, &exported).unwrap();

    let other_db = home.join("data/other.db");
    let imported = est_ok(
        home,
        &other_db,
        &["import", export_path.to_str().unwrap()],
    );
    assert_eq!(imported, "Imported 1 estimate(s) and 0 capacity block(s)\n");
    assert_eq!(est_ok(home, &other_db, &["export"]), exported);
    assert_eq!(
        allocations(home, &other_db, &id[..8]),
        vec![
            alloc("2025-01-06", 300, "auto"),
            alloc("2025-01-07", 300, "manual")
        ]
    );
}

#[test]
fn test_blocks_and_actuals() {
    let env = setup();
    let (home, db) = (env.home.as_path(), env.db.as_path());

    est_ok(home, db, &["estimate", "add", "Review", "12h"]);
    let list = est_json(home, db, &["estimate", "list", "--json"]);
    let id = list[0]["id"].as_str().unwrap().to_string();

    // A vacation day pushes effort past it.
    let added = est_ok(home, db, &["block", "add", "2025-01-07", "--note", "dentist"]);
    assert!(added.starts_with("Added vacation block "), "got: {added}");
    assert_eq!(
        allocations(home, db, &id),
        vec![
            alloc("2025-01-06", 480, "auto"),
            alloc("2025-01-08", 240, "auto")
        ]
    );

    let blocks = est_json(home, db, &["block", "list", "--json"]);
    let block_id = blocks[0]["id"].as_str().unwrap().to_string();
    est_ok(home, db, &["block", "rm", &block_id[..8]]);
    assert_eq!(
        allocations(home, db, &id),
        vec![
            alloc("2025-01-06", 480, "auto"),
            alloc("2025-01-07", 240, "auto")
        ]
    );

    est_ok(home, db, &["actual", &id, "today", "9h"]);
    let report = est_json(home, db, &["report", "--json"]);
    assert_eq!(report["through"], "2025-01-06");
    assert_eq!(report["estimates"][0]["variance_minutes"], 60);
}

#[test]
fn test_unknown_estimate_fails() {
    let env = setup();
    let output = est(&env.home, &env.db, &["show", "nope"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope"));
}
