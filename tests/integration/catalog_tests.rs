//! Catalog and normalization property tests

use apkmerge::catalog::{IdentifierCatalog, PlaceholderPattern};
use apkmerge::discovery::SplitSet;
use apkmerge::normalize::{AmpersandRepairer, VisibilityNormalizer};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn tree_with_table(dir: &Path, name: &str, split: Option<&str>, table: &str) -> PathBuf {
    let root = dir.join(name);
    let split_attr = split.map(|s| format!(" split=\"{s}\"")).unwrap_or_default();
    write(
        root.join("AndroidManifest.xml").as_path(),
        &format!("<manifest package=\"com.example\"{split_attr}><application /></manifest>"),
    );
    write(root.join("res/values/public.xml").as_path(), table);
    root
}

#[test]
fn placeholders_resolve_across_more_than_two_splits() {
    let dir = TempDir::new().unwrap();
    let base = tree_with_table(
        dir.path(),
        "base",
        None,
        r#"<resources>
    <public type="drawable" name="APKTOOL_DUMMY_a" id="0x7f02000a" />
    <public type="string" name="APKTOOL_DUMMY_3" id="0x7f010003" />
</resources>"#,
    );
    let split_a = tree_with_table(
        dir.path(),
        "split_a",
        Some("config.xhdpi"),
        r#"<resources>
    <public type="drawable" name="header_bg" id="0x7f02000a" />
</resources>"#,
    );
    let split_b = tree_with_table(
        dir.path(),
        "split_b",
        Some("config.fr"),
        r#"<resources>
    <public type="string" name="cancel_label" id="0x7f010003" />
</resources>"#,
    );

    let set = SplitSet::from_roots(&[base, split_a, split_b], 0);
    let catalog = IdentifierCatalog::new(PlaceholderPattern::new("APKTOOL_DUMMY_"));
    let (map, report) = catalog.build(&set).unwrap();

    assert_eq!(report.resolved, 2);
    assert_eq!(report.unresolved, 0);
    assert_eq!(map.resolve("APKTOOL_DUMMY_a"), Some("header_bg"));
    assert_eq!(map.resolve("APKTOOL_DUMMY_3"), Some("cancel_label"));
}

#[test]
fn same_name_in_two_splits_is_not_a_conflict() {
    let dir = TempDir::new().unwrap();
    let base = tree_with_table(
        dir.path(),
        "base",
        None,
        r#"<resources>
    <public type="string" name="APKTOOL_DUMMY_1" id="0x7f010001" />
</resources>"#,
    );
    let split_a = tree_with_table(
        dir.path(),
        "split_a",
        Some("config.fr"),
        r#"<resources>
    <public type="string" name="app_title" id="0x7f010001" />
</resources>"#,
    );
    let split_b = tree_with_table(
        dir.path(),
        "split_b",
        Some("config.de"),
        r#"<resources>
    <public type="string" name="app_title" id="0x7f010001" />
</resources>"#,
    );

    let set = SplitSet::from_roots(&[base, split_a, split_b], 0);
    let catalog = IdentifierCatalog::new(PlaceholderPattern::new("APKTOOL_DUMMY_"));
    let (map, report) = catalog.build(&set).unwrap();

    assert!(report.conflicts.is_empty());
    assert_eq!(map.resolve("APKTOOL_DUMMY_1"), Some("app_title"));
}

#[test]
fn custom_placeholder_prefix_is_honored() {
    let dir = TempDir::new().unwrap();
    let base = tree_with_table(
        dir.path(),
        "base",
        None,
        r#"<resources>
    <public type="string" name="STUB_ff" id="0x7f010001" />
    <public type="string" name="APKTOOL_DUMMY_2" id="0x7f010002" />
</resources>"#,
    );
    let split = tree_with_table(
        dir.path(),
        "split",
        Some("config.fr"),
        r#"<resources>
    <public type="string" name="real_name" id="0x7f010001" />
</resources>"#,
    );

    let set = SplitSet::from_roots(&[base, split], 0);
    let catalog = IdentifierCatalog::new(PlaceholderPattern::new("STUB_"));
    let (map, report) = catalog.build(&set).unwrap();

    // Only the configured prefix classifies as placeholder
    assert_eq!(map.resolve("STUB_ff"), Some("real_name"));
    assert_eq!(map.resolve("APKTOOL_DUMMY_2"), None);
    assert_eq!(report.resolved, 1);
}

#[test]
fn ampersand_repair_is_idempotent_over_a_tree() {
    let dir = TempDir::new().unwrap();
    let res = dir.path().join("res");
    write(
        res.join("values/strings.xml").as_path(),
        r#"<resources>
    <string name="mix">Salt & Pepper &amp; Vinegar &#233;</string>
</resources>"#,
    );

    let repairer = AmpersandRepairer::new();
    let first = repairer.repair_tree(&res).unwrap();
    let after_first = std::fs::read_to_string(res.join("values/strings.xml")).unwrap();
    let second = repairer.repair_tree(&res).unwrap();
    let after_second = std::fs::read_to_string(res.join("values/strings.xml")).unwrap();

    assert_eq!(first, 1);
    assert_eq!(second, 0);
    assert_eq!(after_first, after_second);
    assert!(after_first.contains("Salt &amp; Pepper &amp; Vinegar &#233;"));
}

#[test]
fn visibility_is_monotonic() {
    let dir = TempDir::new().unwrap();
    let res = dir.path().join("res");
    write(
        res.join("values/public.xml").as_path(),
        r#"<resources>
    <public type="string" name="already_public" id="0x7f010001" />
</resources>"#,
    );
    write(
        res.join("values/strings.xml").as_path(),
        r#"<resources>
    <string name="already_public">a</string>
    <string name="was_private">b</string>
</resources>"#,
    );

    let pattern = PlaceholderPattern::new("APKTOOL_DUMMY_");
    let normalizer = VisibilityNormalizer::new(&pattern);
    normalizer.publicize(&res).unwrap();

    let table = std::fs::read_to_string(res.join("values/public.xml")).unwrap();
    // Public entries stay public, private entries became public
    assert!(table.contains("already_public"));
    assert!(table.contains("was_private"));

    // And a second pass changes nothing
    let stats = normalizer.publicize(&res).unwrap();
    assert_eq!(stats.publicized, 0);
    let again = std::fs::read_to_string(res.join("values/public.xml")).unwrap();
    assert_eq!(table, again);
}
