#![allow(dead_code)]

use std::path::{Path, PathBuf};

use branchcov::config::Config;
use tempfile::TempDir;

pub const DATASET: &str = include_str!("../fixtures/data.json");
pub const CLOVER: &str = include_str!("../fixtures/clover.xml");

const PAGES: &[(&str, &str)] = &[
    ("index.html", include_str!("../fixtures/report/index.html")),
    ("dashboard.html", include_str!("../fixtures/report/dashboard.html")),
    ("A.php.html", include_str!("../fixtures/report/A.php.html")),
    ("lib/index.html", include_str!("../fixtures/report/lib/index.html")),
    ("lib/B.php.html", include_str!("../fixtures/report/lib/B.php.html")),
];

/// A rendered report, its Clover summary and the branch dataset laid out in
/// a fresh temporary directory. The caller must hold onto `TempDir` to keep
/// the temp directory alive.
pub struct Workspace {
    pub dir: TempDir,
    pub dataset: PathBuf,
    pub clover: PathBuf,
    pub report: PathBuf,
}

impl Workspace {
    pub fn page(&self, relative: &str) -> String {
        std::fs::read_to_string(self.report.join(relative)).unwrap()
    }

    pub fn clover_xml(&self) -> String {
        std::fs::read_to_string(&self.clover).unwrap()
    }

    /// Config patching everything in this workspace, keeping the dataset.
    pub fn config(&self) -> Config {
        Config {
            dataset: self.dataset.clone(),
            output_dir: self.report.clone(),
            clover: Some(self.clover.clone()),
            remove_dataset: false,
            ..Config::default()
        }
    }
}

pub fn setup_workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("data.json");
    let clover = dir.path().join("clover.xml");
    let report = dir.path().join("report");

    std::fs::write(&dataset, DATASET).unwrap();
    std::fs::write(&clover, CLOVER).unwrap();
    for (relative, content) in PAGES {
        write_page(&report, relative, content);
    }

    Workspace {
        dir,
        dataset,
        clover,
        report,
    }
}

pub fn write_page(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// The `<tr>` of `html` whose text contains `needle`.
pub fn row_with<'a>(html: &'a str, needle: &str) -> &'a str {
    html.split("<tr")
        .skip(1)
        .map(|row| row.split("</tr>").next().unwrap())
        .find(|row| row.contains(needle))
        .unwrap_or_else(|| panic!("no row containing {needle:?}"))
}

/// The `hit / total` cell appended by the branch overlay.
pub fn branch_cell(hit: u64, total: u64) -> String {
    format!(
        r#"{}><div align="right">{hit}&nbsp;/&nbsp;{total}</div></td>"#,
        branchcov::badge::MARKER_ATTR
    )
}
