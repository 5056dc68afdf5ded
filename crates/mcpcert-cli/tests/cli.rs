use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn checkout(root: &Path) {
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("src/auth.py"), "def verify(token): return bool(token)").unwrap();
    fs::write(root.join("config.json"), "{\"port\": 8080}").unwrap();
    fs::write(
        root.join("README.md"),
        "# weather-server\nAn MCP server exposing a weather tool.",
    )
    .unwrap();
}

fn cmd() -> Command {
    Command::cargo_bin("mcpcert").unwrap()
}

#[test]
fn criteria_prints_rubric() {
    cmd()
        .arg("criteria")
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluation criteria (version 1.0.0)"))
        .stdout(predicate::str::contains("Gold"))
        .stdout(predicate::str::contains("Prompt Security"));
}

#[test]
fn criteria_json_is_valid() {
    let output = cmd().args(["criteria", "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["version"], "1.0.0");
    assert_eq!(value["tiers"].as_array().unwrap().len(), 3);
}

#[test]
fn offline_evaluate_produces_bronze_report() {
    let repo = tempfile::tempdir().unwrap();
    checkout(repo.path());
    let store = tempfile::tempdir().unwrap();

    cmd()
        .args([
            "--store-dir",
            store.path().to_str().unwrap(),
            "evaluate",
            repo.path().to_str().unwrap(),
            "--url",
            "https://github.com/example/weather-server",
            "--offline",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "# MCP Security Profile: weather-server",
        ))
        .stdout(predicate::str::contains("- **Certification Level**: Bronze"));
}

#[test]
fn report_follows_evaluate_in_same_store() {
    let repo = tempfile::tempdir().unwrap();
    checkout(repo.path());
    let store = tempfile::tempdir().unwrap();
    let store_dir = store.path().to_str().unwrap();
    let url = "https://github.com/example/weather-server";

    cmd()
        .args([
            "--store-dir",
            store_dir,
            "evaluate",
            repo.path().to_str().unwrap(),
            "--url",
            url,
            "--offline",
        ])
        .assert()
        .success();

    let output = cmd()
        .args(["--store-dir", store_dir, "report", "--url", url, "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["profile"]["certification"]["level"], "Bronze");
    assert_eq!(value["repository"]["url"], url);

    cmd()
        .args(["--store-dir", store_dir, "history", "--url", url])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 certification event(s)"));
}

#[test]
fn report_without_evaluation_fails_clearly() {
    let store = tempfile::tempdir().unwrap();
    cmd()
        .args([
            "--store-dir",
            store.path().to_str().unwrap(),
            "report",
            "--url",
            "https://github.com/example/unknown",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no evaluation found"));
}

#[test]
fn evaluate_missing_checkout_reports_fetch_error() {
    let store = tempfile::tempdir().unwrap();
    cmd()
        .args([
            "--store-dir",
            store.path().to_str().unwrap(),
            "evaluate",
            "/definitely/not/a/checkout",
            "--url",
            "https://github.com/example/ghost",
            "--offline",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("evaluation failed"));
}

#[test]
fn config_file_sets_analysis_model() {
    let repo = tempfile::tempdir().unwrap();
    checkout(repo.path());
    let store = tempfile::tempdir().unwrap();
    let config = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    fs::write(
        config.path(),
        "[analysis]\nprovider = \"noop\"\nmodel = \"config-model\"\n",
    )
    .unwrap();

    cmd()
        .args([
            "--config",
            config.path().to_str().unwrap(),
            "--store-dir",
            store.path().to_str().unwrap(),
            "evaluate",
            repo.path().to_str().unwrap(),
            "--url",
            "https://github.com/example/weather-server",
        ])
        .env_remove("MCPCERT_PROVIDER")
        .env_remove("MCPCERT_API_KEY")
        .assert()
        .success()
        .stdout(predicate::str::contains("Certification Level"));
}
