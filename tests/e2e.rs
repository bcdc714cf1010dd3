use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn run(data_dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_bee-ledger"))
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn json(stdout: &str) -> Value {
    serde_json::from_str(stdout).expect("stdout is not json")
}

#[test]
fn top_up_is_credited_after_approval() {
    let dir = TempDir::new().unwrap();

    let (stdout, stderr, success) = run(dir.path(), &["top-up", "u1", "100000"]);
    assert!(success, "{stderr}");
    let receipt = json(&stdout);
    assert_eq!(receipt["receipt"], "requested");
    assert_eq!(receipt["kind"], "topUp");
    let reference = receipt["reference"].as_str().unwrap().to_string();

    let (stdout, _, success) = run(dir.path(), &["pending"]);
    assert!(success);
    assert!(json(&stdout).get(&reference).is_some());

    let (stdout, stderr, success) = run(
        dir.path(),
        &["decide", &reference, "approve", "--actor", "admin", "--admin"],
    );
    assert!(success, "{stderr}");
    let settled = json(&stdout);
    assert_eq!(settled["settlement"], "top_up");
    assert_eq!(settled["total"], 74);

    let (stdout, _, success) = run(dir.path(), &["balance", "u1"]);
    assert!(success);
    assert_eq!(json(&stdout)["balance"], 74);

    let (stdout, _, success) = run(dir.path(), &["accounts"]);
    assert!(success);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["user,balance,first_topup_used", "u1,74,true"]);
}

#[test]
fn second_decision_reports_already_handled() {
    let dir = TempDir::new().unwrap();
    let (stdout, _, _) = run(dir.path(), &["top-up", "u1", "50000"]);
    let reference = json(&stdout)["reference"].as_str().unwrap().to_string();

    let args = ["decide", &reference, "reject", "--actor", "admin", "--admin"];
    let (_, _, success) = run(dir.path(), &args);
    assert!(success);

    let (_, stderr, success) = run(dir.path(), &args);
    assert!(!success);
    assert!(stderr.contains("no longer exists"));
}

#[test]
fn refused_intents_exit_with_user_message() {
    let dir = TempDir::new().unwrap();

    let (stdout, stderr, success) = run(dir.path(), &["transfer", "a", "a", "5"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("cannot send Bee Coin to yourself"));

    let withdraw = [
        "withdraw",
        "a",
        "20",
        "--account-number",
        "1",
        "--bank",
        "VCB",
        "--owner",
        "A",
    ];
    let (_, stderr, success) = run(dir.path(), &withdraw);
    assert!(!success);
    assert!(stderr.contains("not enough"));
}

#[test]
fn replay_applies_intents_and_skips_bad_lines() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("intents.jsonl");
    std::fs::write(
        &log,
        [
            r#"{"type":"request_top_up","user":"u1","amount_vnd":20000}"#,
            r#"{"type":"request_top_up","user":"u2","amount_vnd":5}"#,
            r#"{"type":"no_such_intent"}"#,
            "",
            r#"{"type":"request_transfer","sender":"u1","receiver":"u2","amount":3}"#,
        ]
        .join("\n"),
    )
    .unwrap();

    let data = dir.path().join("data");
    let (_, stderr, success) = run(&data, &["replay", log.to_str().unwrap()]);
    assert!(success);
    assert!(stderr.contains("invalid intent"));

    let (stdout, _, success) = run(&data, &["pending"]);
    assert!(success);
    let pending = json(&stdout);
    let kinds: Vec<&str> = pending
        .as_object()
        .unwrap()
        .values()
        .map(|request| request["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&"topUp"));
    assert!(kinds.contains(&"transfer"));
}
