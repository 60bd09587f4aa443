//! End-to-end reconciliation scenarios
//!
//! Each test builds a small extracted app bundle in a temp directory and
//! runs the full pipeline over it.

use apkmerge::config::Config;
use apkmerge::discovery::SplitSet;
use apkmerge::engine::{ReconcileError, Reconciler, INCOMPLETE_MARKER};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn base_manifest() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example.demo">
    <application android:name=".App" android:isSplitRequired="true">
        <meta-data android:name="com.android.vending.splits.required" android:value="true" />
        <activity android:name=".MainActivity" />
    </application>
</manifest>"#
}

fn split_manifest(split: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="com.example.demo" split="{split}">
    <application />
</manifest>"#
    )
}

/// Base with a placeholder identifier, split holding the true name
fn dummy_bundle(dir: &Path) -> Vec<PathBuf> {
    let base = dir.join("demo-base");
    write(base.join("AndroidManifest.xml").as_path(), base_manifest());
    write(
        base.join("res/values/public.xml").as_path(),
        r#"<?xml version="1.0" encoding="utf-8"?>
<resources>
    <public type="string" name="APKTOOL_DUMMY_1" id="0x7f010001" />
    <public type="string" name="greeting" id="0x7f010002" />
</resources>"#,
    );
    write(
        base.join("res/values/strings.xml").as_path(),
        r#"<?xml version="1.0" encoding="utf-8"?>
<resources>
    <string name="APKTOOL_DUMMY_1">Hello</string>
    <string name="greeting">Hi</string>
</resources>"#,
    );
    write(
        base.join("res/layout/activity_main.xml").as_path(),
        r#"<?xml version="1.0" encoding="utf-8"?>
<TextView xmlns:android="http://schemas.android.com/apk/res/android"
    android:text="@string/APKTOOL_DUMMY_1" />"#,
    );

    let split = dir.join("demo-split_config.xhdpi");
    write(
        split.join("AndroidManifest.xml").as_path(),
        &split_manifest("config.xhdpi"),
    );
    write(
        split.join("res/values/public.xml").as_path(),
        r#"<?xml version="1.0" encoding="utf-8"?>
<resources>
    <public type="string" name="app_title" id="0x7f010001" />
</resources>"#,
    );
    write(
        split.join("res/values/strings.xml").as_path(),
        r#"<?xml version="1.0" encoding="utf-8"?>
<resources>
    <string name="app_title">Hello</string>
</resources>"#,
    );
    write(
        split.join("res/drawable-xhdpi/logo.png").as_path(),
        "binary",
    );

    vec![base, split]
}

#[test]
fn dummy_names_are_resolved_end_to_end() {
    let dir = TempDir::new().unwrap();
    let roots = dummy_bundle(dir.path());
    let set = SplitSet::from_roots(&roots, 0);
    let config = Config::default();

    let summary = Reconciler::new(&config).reconcile(&set).unwrap();

    assert_eq!(summary.splits_merged, 1);
    assert_eq!(summary.identifiers_resolved, 1);
    assert_eq!(summary.identifiers_unresolved, 0);
    assert_eq!(summary.identifier_conflicts, 0);

    let base = &roots[0];
    let values = std::fs::read_to_string(base.join("res/values/strings.xml")).unwrap();
    assert!(values.contains("name=\"app_title\""));
    assert!(!values.contains("APKTOOL_DUMMY"));
    assert_eq!(values.matches("name=\"app_title\"").count(), 1);

    let layout = std::fs::read_to_string(base.join("res/layout/activity_main.xml")).unwrap();
    assert!(layout.contains("@string/app_title"));

    // The split's drawable landed in base
    assert!(base.join("res/drawable-xhdpi/logo.png").exists());

    // Manifest no longer declares splitting
    let manifest = std::fs::read_to_string(base.join("AndroidManifest.xml")).unwrap();
    assert!(!manifest.contains("isSplitRequired"));
    assert!(!manifest.contains("com.android.vending.splits"));

    // The finished tree carries no in-progress marker
    assert!(!base.join(INCOMPLETE_MARKER).exists());
}

#[test]
fn no_placeholder_occurrences_remain_after_reconciliation() {
    let dir = TempDir::new().unwrap();
    let roots = dummy_bundle(dir.path());
    let set = SplitSet::from_roots(&roots, 0);
    let config = Config::default();

    Reconciler::new(&config).reconcile(&set).unwrap();

    // Round-trip completeness: resolvable placeholders disappear entirely
    for entry in walkdir::WalkDir::new(roots[0].join("res")) {
        let entry = entry.unwrap();
        if entry.file_type().is_file() {
            if let Ok(text) = std::fs::read_to_string(entry.path()) {
                assert!(
                    !text.contains("APKTOOL_DUMMY_1"),
                    "placeholder left in {}",
                    entry.path().display()
                );
            }
        }
    }
}

#[test]
fn single_package_run_is_a_noop_with_zero_counters() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("demo");
    write(
        base.join("AndroidManifest.xml").as_path(),
        r#"<manifest package="com.example.demo"><application /></manifest>"#,
    );
    write(
        base.join("res/values/strings.xml").as_path(),
        r#"<resources><string name="app_name">Demo</string></resources>"#,
    );
    let before = std::fs::read_to_string(base.join("res/values/strings.xml")).unwrap();

    let set = SplitSet::from_roots(std::slice::from_ref(&base), 0);
    let config = Config::default();
    let summary = Reconciler::new(&config).reconcile(&set).unwrap();

    assert_eq!(summary.splits_merged, 0);
    assert_eq!(summary.identifiers_resolved, 0);
    assert_eq!(summary.identifiers_unresolved, 0);
    assert_eq!(summary.files_copied, 0);
    assert_eq!(summary.definitions_renamed, 0);
    assert_eq!(summary.references_updated, 0);
    assert_eq!(summary.duplicates_dropped, 0);
    assert_eq!(summary.ampersand_fixes, 0);
    assert_eq!(summary.resources_publicized, 0);

    let after = std::fs::read_to_string(base.join("res/values/strings.xml")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn conflicting_bindings_keep_base_name_and_do_not_abort() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("demo-base");
    write(base.join("AndroidManifest.xml").as_path(), base_manifest());
    write(
        base.join("res/values/public.xml").as_path(),
        r#"<resources>
    <public type="string" name="title_a" id="0x7f010001" />
</resources>"#,
    );
    write(
        base.join("res/values/strings.xml").as_path(),
        r#"<resources><string name="title_a">A</string></resources>"#,
    );

    let split = dir.path().join("demo-split_config.fr");
    write(
        split.join("AndroidManifest.xml").as_path(),
        &split_manifest("config.fr"),
    );
    write(
        split.join("res/values/public.xml").as_path(),
        r#"<resources>
    <public type="string" name="title_b" id="0x7f010001" />
</resources>"#,
    );

    let roots = vec![base.clone(), split];
    let set = SplitSet::from_roots(&roots, 0);
    let config = Config::default();
    let summary = Reconciler::new(&config).reconcile(&set).unwrap();

    assert_eq!(summary.identifier_conflicts, 1);
    assert!(summary.conflicts[0].contains("title_a"));
    assert!(summary.conflicts[0].contains("title_b"));

    // Base's binding survives; the discarded one is deduplicated by id
    let table = std::fs::read_to_string(base.join("res/values/public.xml")).unwrap();
    assert!(table.contains("title_a"));
    assert_eq!(table.matches("0x7f010001").count(), 1);
}

#[test]
fn failed_merge_leaves_the_tree_marked_incomplete() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("demo-base");
    write(base.join("AndroidManifest.xml").as_path(), base_manifest());
    // A file where the split carries a directory
    write(base.join("assets").as_path(), "not a directory");

    let split = dir.path().join("demo-split_config.fr");
    write(
        split.join("AndroidManifest.xml").as_path(),
        &split_manifest("config.fr"),
    );
    write(split.join("assets/blob.bin").as_path(), "data");

    let roots = vec![base.clone(), split];
    let set = SplitSet::from_roots(&roots, 0);
    let config = Config::default();
    let err = Reconciler::new(&config).reconcile(&set).unwrap_err();

    assert!(matches!(err, ReconcileError::Merge(_)));
    assert!(base.join(INCOMPLETE_MARKER).exists());
}

#[test]
fn merged_tree_contains_union_of_split_files() {
    let dir = TempDir::new().unwrap();
    let roots = dummy_bundle(dir.path());
    // Add extra content to the split before merging
    write(
        roots[1].join("lib/arm64-v8a/libdemo.so").as_path(),
        "elf",
    );
    write(roots[1].join("assets/data/pack.bin").as_path(), "pack");

    let set = SplitSet::from_roots(&roots, 0);
    let config = Config::default();
    let summary = Reconciler::new(&config).reconcile(&set).unwrap();

    assert!(roots[0].join("lib/arm64-v8a/libdemo.so").exists());
    assert!(roots[0].join("assets/data/pack.bin").exists());
    // Every split file either landed in base or was accounted for
    assert_eq!(summary.files_skipped, 0);
    assert!(summary.files_copied >= 3);
}

#[test]
fn resources_are_publicized_before_rebuild() {
    let dir = TempDir::new().unwrap();
    let roots = dummy_bundle(dir.path());
    // One base string is defined but missing from the identifier table
    write(
        roots[0].join("res/values/extra.xml").as_path(),
        r#"<resources><string name="internal_note">x</string></resources>"#,
    );

    let set = SplitSet::from_roots(&roots, 0);
    let config = Config::default();
    let summary = Reconciler::new(&config).reconcile(&set).unwrap();

    assert!(summary.resources_publicized >= 1);
    let table = std::fs::read_to_string(roots[0].join("res/values/public.xml")).unwrap();
    assert!(table.contains("internal_note"));
}
