//! CLI integration tests
//!
//! These tests verify that the CLI works correctly with various options.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// A minimal two-tree bundle: base with a placeholder, split with the name
fn fixture_bundle(dir: &Path) -> (PathBuf, PathBuf) {
    let base = dir.join("demo-base");
    write(
        base.join("AndroidManifest.xml").as_path(),
        r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example.demo">
    <application android:isSplitRequired="true" />
</manifest>"#,
    );
    write(
        base.join("res/values/public.xml").as_path(),
        r#"<resources>
    <public type="string" name="APKTOOL_DUMMY_1" id="0x7f010001" />
</resources>"#,
    );
    write(
        base.join("res/values/strings.xml").as_path(),
        r#"<resources><string name="APKTOOL_DUMMY_1">Hi</string></resources>"#,
    );

    let split = dir.join("demo-split_config.fr");
    write(
        split.join("AndroidManifest.xml").as_path(),
        r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="com.example.demo" split="config.fr">
    <application />
</manifest>"#,
    );
    write(
        split.join("res/values/public.xml").as_path(),
        r#"<resources>
    <public type="string" name="app_title" id="0x7f010001" />
</resources>"#,
    );

    (base, split)
}

fn apkmerge() -> Command {
    Command::cargo_bin("apkmerge").expect("binary builds")
}

#[test]
fn test_cli_help() {
    apkmerge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("apkmerge"))
        .stdout(predicate::str::contains("--base"))
        .stdout(predicate::str::contains("--dummy-prefix"));
}

#[test]
fn test_cli_version() {
    apkmerge()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("apkmerge"));
}

#[test]
fn test_cli_requires_trees() {
    apkmerge().assert().failure();
}

#[test]
fn test_cli_rejects_missing_directory() {
    apkmerge()
        .arg("/nonexistent/tree")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn test_cli_merges_a_bundle() {
    let dir = TempDir::new().unwrap();
    let (base, split) = fixture_bundle(dir.path());

    apkmerge()
        .arg(&base)
        .arg(&split)
        .assert()
        .success()
        .stdout(predicate::str::contains("Reconciliation complete."));

    let values = std::fs::read_to_string(base.join("res/values/strings.xml")).unwrap();
    assert!(values.contains("app_title"));
}

#[test]
fn test_cli_explicit_base_flag() {
    let dir = TempDir::new().unwrap();
    let (base, split) = fixture_bundle(dir.path());

    apkmerge()
        .arg(&split)
        .arg(&base)
        .arg("--base")
        .arg(&base)
        .arg("--quiet")
        .assert()
        .success();
}

#[test]
fn test_cli_json_report() {
    let dir = TempDir::new().unwrap();
    let (base, split) = fixture_bundle(dir.path());

    let output = apkmerge()
        .arg(&base)
        .arg(&split)
        .arg("--quiet")
        .arg("--format")
        .arg("json")
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON report");
    assert_eq!(value["summary"]["splits_merged"], 1);
    assert_eq!(value["summary"]["identifiers_resolved"], 1);
}

#[test]
fn test_cli_json_report_to_file() {
    let dir = TempDir::new().unwrap();
    let (base, split) = fixture_bundle(dir.path());
    let report_path = dir.path().join("summary.json");

    apkmerge()
        .arg(&base)
        .arg(&split)
        .arg("--quiet")
        .arg("--format")
        .arg("json")
        .arg("--output")
        .arg(&report_path)
        .assert()
        .success();

    let text = std::fs::read_to_string(&report_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["summary"]["splits_merged"], 1);
}

#[test]
fn test_cli_no_publicize_flag() {
    let dir = TempDir::new().unwrap();
    let (base, split) = fixture_bundle(dir.path());
    // An extra private definition that publicizing would pick up
    write(
        base.join("res/values/extra.xml").as_path(),
        r#"<resources><string name="private_extra">x</string></resources>"#,
    );

    apkmerge()
        .arg(&base)
        .arg(&split)
        .arg("--quiet")
        .arg("--no-publicize")
        .assert()
        .success();

    let table = std::fs::read_to_string(base.join("res/values/public.xml")).unwrap();
    assert!(!table.contains("private_extra"));
}
