//! One complete overlay run: dataset, Clover summary, file pages, then
//! directory pages from the leaves up.
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::aggregate::{self, Counts};
use crate::config::Config;
use crate::dataset::BranchDataset;
use crate::error::Result;
use crate::model::Aggregate;
use crate::patch::{self, clover, html, PatchOutcome};
use crate::tree::{self, TreeNode};

/// Suffix of the pristine copy kept when `backup` is set.
pub const BACKUP_SUFFIX: &str = ".orig";

/// Tally of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlaySummary {
    /// Files left in the dataset after exclusion.
    pub files: usize,
    pub files_patched: usize,
    pub files_missing: usize,
    pub files_unrecognized: usize,
    pub directories_patched: usize,
    /// Artifacts that could not be read or written.
    pub failures: usize,
    pub clover: Option<PatchOutcome>,
    /// Project-wide branch counts.
    pub branches: Aggregate,
    /// Project-wide path counts.
    pub paths: Aggregate,
    pub dataset_removed: bool,
}

impl OverlaySummary {
    fn record(&mut self, outcome: PatchOutcome) {
        match outcome {
            PatchOutcome::Patched => self.files_patched += 1,
            PatchOutcome::Missing => self.files_missing += 1,
            PatchOutcome::Unrecognized => self.files_unrecognized += 1,
        }
    }
}

/// Run the overlay described by `config`.
///
/// Loading the dataset or reading the output root are the only hard
/// failures; a single artifact failing is logged, counted, and skipped.
pub fn overlay(config: &Config) -> Result<OverlaySummary> {
    let dataset = BranchDataset::load(&config.dataset, &config.exclude)?;
    let counts = aggregate::branch_counts(&dataset);
    let mut summary = OverlaySummary {
        files: dataset.len(),
        branches: aggregate::project_total(&counts),
        paths: aggregate::project_total(&aggregate::path_counts(&dataset)),
        ..Default::default()
    };
    info!(files = dataset.len(), dataset = %config.dataset.display(), "loaded branch dataset");

    if let Some(clover) = &config.clover {
        summary.clover = patch_clover(clover, &dataset, config.backup, &mut summary.failures);
    }

    let source_root = resolve_source_root(config, &dataset);
    debug!(source_root = %source_root.display(), "mapping source files to pages");
    patch_file_pages(config, &dataset, &counts, &source_root, &mut summary);

    let tree = tree::build_tree(&config.output_dir, &config.leaf_suffix)?;
    patch_directories(&config.output_dir, &tree, &mut summary);

    if config.remove_dataset && summary.failures == 0 {
        match std::fs::remove_file(&config.dataset) {
            Ok(()) => summary.dataset_removed = true,
            Err(e) => warn!(path = %config.dataset.display(), error = %e, "could not remove dataset"),
        }
    }

    info!(
        patched = summary.files_patched,
        missing = summary.files_missing,
        directories = summary.directories_patched,
        failures = summary.failures,
        "branch overlay finished"
    );
    Ok(summary)
}

fn patch_clover(
    path: &Path,
    dataset: &BranchDataset,
    backup: bool,
    failures: &mut usize,
) -> Option<PatchOutcome> {
    if backup && path.is_file() {
        let backup_path = with_suffix(path, BACKUP_SUFFIX);
        // An existing backup is the pristine one from the first run.
        if !backup_path.exists() {
            if let Err(e) = std::fs::copy(path, &backup_path) {
                warn!(path = %backup_path.display(), error = %e, "could not back up clover summary");
                *failures += 1;
                return None;
            }
        }
    }
    match patch::patch_clover_at(path, dataset) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not patch clover summary");
            *failures += 1;
            None
        }
    }
}

/// Directory the report was rendered for. Unless configured, it is learned
/// from the report: the common directory of the Clover summary's files, else
/// the breadcrumb root of the top `index.html`. The dataset's own common
/// directory is the last resort, since it only matches the report when the
/// dataset spans the same files.
fn resolve_source_root(config: &Config, dataset: &BranchDataset) -> PathBuf {
    if let Some(root) = &config.source_root {
        return root.clone();
    }
    if let Some(root) = config.clover.as_deref().and_then(clover_root) {
        return root;
    }
    let index = config.output_dir.join("index.html");
    if let Some(root) = std::fs::read_to_string(&index)
        .ok()
        .and_then(|html| html::breadcrumb_root(&html))
    {
        return PathBuf::from(root);
    }
    warn!("source root not found in the report; using the dataset's common directory");
    common_root(dataset.files().map(|(path, _)| Path::new(path)))
}

fn clover_root(path: &Path) -> Option<PathBuf> {
    let content = std::fs::read(path).ok()?;
    let keys = match clover::file_keys(&content) {
        Ok(keys) => keys,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no source root from clover summary");
            return None;
        }
    };
    if keys.is_empty() {
        return None;
    }
    Some(common_root(keys.iter().map(Path::new)))
}

fn patch_file_pages(
    config: &Config,
    dataset: &BranchDataset,
    counts: &Counts,
    source_root: &Path,
    summary: &mut OverlaySummary,
) {
    for (file, _) in dataset.files() {
        let Some(page) = page_path(&config.output_dir, source_root, Path::new(file)) else {
            debug!(file, "source file outside of source root");
            summary.record(PatchOutcome::Missing);
            continue;
        };
        match patch::patch_file_at(&page, counts, file) {
            Ok(outcome) => summary.record(outcome),
            Err(e) => {
                warn!(page = %page.display(), error = %e, "could not patch file page");
                summary.failures += 1;
            }
        }
    }
}

/// Patch every directory's `index.html`, children before their parent.
fn patch_directories(dir: &Path, node: &TreeNode, summary: &mut OverlaySummary) {
    for child in node.children().filter(|c| c.is_directory()) {
        patch_directories(&dir.join(child.name()), child, summary);
    }
    let index = dir.join("index.html");
    match patch::patch_directory_at(&index, node) {
        Ok(PatchOutcome::Patched) => summary.directories_patched += 1,
        Ok(_) => {}
        Err(e) => {
            warn!(page = %index.display(), error = %e, "could not patch directory page");
            summary.failures += 1;
        }
    }
}

/// Page rendered for `source`: its path relative to `source_root`, under
/// `output_dir`, with `.html` appended.
#[must_use]
pub fn page_path(output_dir: &Path, source_root: &Path, source: &Path) -> Option<PathBuf> {
    let relative = source.strip_prefix(source_root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(with_suffix(&output_dir.join(relative), ".html"))
}

/// Longest common directory of `paths`.
#[must_use]
pub fn common_root<'a>(paths: impl IntoIterator<Item = &'a Path>) -> PathBuf {
    let mut common: Option<Vec<Component<'a>>> = None;
    for path in paths {
        let dir: Vec<Component<'a>> = path.parent().map(|p| p.components().collect()).unwrap_or_default();
        common = Some(match common {
            None => dir,
            Some(prev) => prev
                .into_iter()
                .zip(dir)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    common.unwrap_or_default().into_iter().collect()
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
