mod common;

use branchcov::aggregate::branch_counts;
use branchcov::dataset::{BranchDataset, DEFAULT_EXCLUDE};
use branchcov::model::Aggregate;
use branchcov::patch::html::patch_file_artifact;
use branchcov::tree::{build_tree, DEFAULT_LEAF_SUFFIX};

use common::write_page;

const PAGE: &str = r#"<table class="table table-bordered">
 <thead><tr><td>&nbsp;</td><td colspan="3">Code Coverage</td></tr></thead>
 <tbody><tr><td class="">Total</td><td>x</td></tr></tbody>
</table>"#;

/// A file page whose Total row reports `hit` of `total` branches.
fn patched_page(hit: u64, total: u64) -> String {
    let branches: Vec<String> = (0..total)
        .map(|i| format!(r#"{{"line_start": {}, "hit": {}}}"#, i + 1, u64::from(i < hit)))
        .collect();
    let json = format!(
        r#"{{"/src/x.php": {{"functions": {{"f": {{"branches": [{}]}}}}}}}}"#,
        branches.join(",")
    );
    let dataset = BranchDataset::from_slice(json.as_bytes(), DEFAULT_EXCLUDE).unwrap();
    patch_file_artifact(PAGE, &branch_counts(&dataset), "/src/x.php").unwrap()
}

#[test]
fn test_build_tree_from_pages() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_page(root, "d/a.php.html", &patched_page(2, 4));
    write_page(root, "d/b.php.html", &patched_page(3, 3));
    write_page(root, "d/index.html", PAGE);
    write_page(root, "c.php.html", &patched_page(0, 1));
    write_page(root, "index.html", PAGE);
    write_page(root, "dashboard.html", PAGE);
    write_page(root, "e/index.html", PAGE);
    write_page(root, "css/style.css", "body {}");

    let tree = build_tree(root, DEFAULT_LEAF_SUFFIX).unwrap();
    assert_eq!(tree.find("d").unwrap().aggregate(), Aggregate::new(5, 7));
    assert_eq!(tree.find("d/a.php.html").unwrap().aggregate(), Aggregate::new(2, 4));
    assert_eq!(tree.find("e").unwrap().aggregate(), Aggregate::default());
    assert_eq!(tree.aggregate(), Aggregate::new(5, 8));

    // Navigation pages and assets are not leaves.
    assert!(tree.find("index.html").is_none());
    assert!(tree.find("dashboard.html").is_none());
    assert!(tree.find("css/style.css").is_none());
}

#[test]
fn test_unpatched_page_counts_as_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_page(dir.path(), "a.php.html", PAGE);
    write_page(dir.path(), "b.php.html", &patched_page(1, 2));

    let tree = build_tree(dir.path(), DEFAULT_LEAF_SUFFIX).unwrap();
    assert_eq!(tree.find("a.php.html").unwrap().aggregate(), Aggregate::default());
    assert_eq!(tree.aggregate(), Aggregate::new(1, 2));
}

#[test]
fn test_custom_leaf_suffix() {
    let dir = tempfile::tempdir().unwrap();
    write_page(dir.path(), "a.rs.html", &patched_page(1, 1));
    write_page(dir.path(), "b.php.html", &patched_page(1, 2));

    let tree = build_tree(dir.path(), ".rs.html").unwrap();
    assert_eq!(tree.aggregate(), Aggregate::new(1, 1));
    assert!(tree.find("b.php.html").is_none());
}

#[test]
fn test_missing_root_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(build_tree(&dir.path().join("nope"), DEFAULT_LEAF_SUFFIX).is_err());
}
