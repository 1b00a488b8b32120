pub mod clover;
pub mod html;

use std::path::Path;

use tracing::debug;

use crate::aggregate::Counts;
use crate::dataset::BranchDataset;
use crate::error::Result;
use crate::tree::TreeNode;

/// What happened to one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Rewritten in place (possibly with identical content).
    Patched,
    /// No artifact at that path; nothing to do.
    Missing,
    /// The artifact exists but lacks the expected structure; left untouched.
    Unrecognized,
}

/// Patch the file page at `path` with the branch counts of source `file`.
pub fn patch_file_at(path: &Path, counts: &Counts, file: &str) -> Result<PatchOutcome> {
    rewrite_text(path, |content| html::patch_file_artifact(content, counts, file))
}

/// Patch the directory index page at `path` with `node`'s aggregates.
pub fn patch_directory_at(path: &Path, node: &TreeNode) -> Result<PatchOutcome> {
    rewrite_text(path, |content| html::patch_directory_artifact(content, node))
}

/// Patch the Clover summary at `path`.
pub fn patch_clover_at(path: &Path, dataset: &BranchDataset) -> Result<PatchOutcome> {
    if !path.is_file() {
        debug!(path = %path.display(), "no clover summary to patch");
        return Ok(PatchOutcome::Missing);
    }
    let content = std::fs::read(path)?;
    let patched = clover::patch_machine_summary(&content, dataset)?;
    if patched != content {
        std::fs::write(path, patched)?;
    }
    Ok(PatchOutcome::Patched)
}

/// Read-modify-write of a text artifact. The artifact is only written when
/// `patch` produced a complete new version.
fn rewrite_text(path: &Path, patch: impl FnOnce(&str) -> Option<String>) -> Result<PatchOutcome> {
    if !path.is_file() {
        debug!(path = %path.display(), "no page to patch");
        return Ok(PatchOutcome::Missing);
    }
    let content = std::fs::read_to_string(path)?;
    match patch(&content) {
        Some(patched) => {
            if patched != content {
                std::fs::write(path, patched)?;
            }
            Ok(PatchOutcome::Patched)
        }
        None => {
            debug!(path = %path.display(), "page has no coverage table");
            Ok(PatchOutcome::Unrecognized)
        }
    }
}
