//! `overlay` and `summary` subcommands. The handlers render their report
//! into a `String` and leave printing to `main`.

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::aggregate;
use crate::badge::format_percentage;
use crate::config::Config;
use crate::dataset::BranchDataset;
use crate::model::Aggregate;
use crate::overlay;
use crate::patch::PatchOutcome;

pub fn cmd_overlay(config: &Config) -> Result<String> {
    let summary = overlay::overlay(config).with_context(|| {
        format!(
            "Failed to overlay {} onto {}",
            config.dataset.display(),
            config.output_dir.display()
        )
    })?;

    let mut out = String::new();
    writeln!(out, "Files:        {}", summary.files)?;
    writeln!(
        out,
        "Pages:        {} patched, {} missing, {} unrecognized",
        summary.files_patched, summary.files_missing, summary.files_unrecognized
    )?;
    writeln!(out, "Directories:  {} patched", summary.directories_patched)?;
    if let Some(outcome) = summary.clover {
        let state = match outcome {
            PatchOutcome::Patched => "patched",
            PatchOutcome::Missing => "missing",
            PatchOutcome::Unrecognized => "unrecognized",
        };
        writeln!(out, "Clover:       {state}")?;
    }
    writeln!(out, "Branches:     {}", format_aggregate(summary.branches))?;
    writeln!(out, "Paths:        {}", format_aggregate(summary.paths))?;
    if summary.failures > 0 {
        writeln!(out, "Failures:     {}", summary.failures)?;
    }
    if summary.dataset_removed {
        writeln!(out, "Removed {}", config.dataset.display())?;
    }
    Ok(out)
}

pub fn cmd_summary(dataset: &Path, exclude: &str) -> Result<String> {
    let dataset = BranchDataset::load(dataset, exclude)
        .with_context(|| format!("Failed to load dataset {}", dataset.display()))?;
    let branches = aggregate::branch_counts(&dataset);
    let paths = aggregate::path_counts(&dataset);

    let mut out = String::new();
    writeln!(out, "Files:      {}", dataset.len())?;
    writeln!(out, "Branches:   {}", format_aggregate(aggregate::project_total(&branches)))?;
    writeln!(out, "Paths:      {}", format_aggregate(aggregate::project_total(&paths)))?;

    if dataset.is_empty() {
        return Ok(out);
    }

    out.push('\n');
    writeln!(out, "{:<60} {:>16} {:>16}", "FILE", "BRANCHES", "PATHS")?;
    writeln!(out, "{}", "-".repeat(94))?;
    for (file, _) in dataset.files() {
        let b = aggregate::file_total(&branches, file);
        let p = aggregate::file_total(&paths, file);
        writeln!(
            out,
            "{:<60} {:>16} {:>16}",
            file,
            format!("{}/{}", b.hit_count, b.branch_count),
            format!("{}/{}", p.hit_count, p.branch_count)
        )?;
    }
    Ok(out)
}

fn format_aggregate(agg: Aggregate) -> String {
    format!(
        "{}/{} ({}%)",
        agg.hit_count,
        agg.branch_count,
        format_percentage(agg.percentage())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_dataset(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("data.json");
        std::fs::write(
            &path,
            br#"{
                "/src/A.php": {"functions": {"A->m": {
                    "branches": [{"line_start": 10, "hit": 1}, {"line_start": 10, "hit": 0}],
                    "paths": [{"hit": 1}]
                }}},
                "/vendor/x/B.php": {"functions": {"b": {"branches": [{"line_start": 1, "hit": 1}]}}}
            }"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_cmd_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dataset(dir.path());
        let out = cmd_summary(&path, "vendor").unwrap();
        assert!(out.contains("Files:      1"));
        assert!(out.contains("Branches:   1/2 (50%)"));
        assert!(out.contains("Paths:      1/1 (100%)"));
        assert!(out.contains("/src/A.php"));
        assert!(!out.contains("/vendor/x/B.php"));
    }

    #[test]
    fn test_cmd_summary_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_summary(&dir.path().join("nope.json"), "vendor").unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load dataset"));
    }

    #[test]
    fn test_cmd_overlay_without_pages() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = write_dataset(dir.path());
        let output_dir = dir.path().join("html");
        std::fs::create_dir(&output_dir).unwrap();

        let config = Config {
            dataset: dataset.clone(),
            output_dir,
            remove_dataset: false,
            ..Config::default()
        };
        let out = cmd_overlay(&config).unwrap();
        assert!(out.contains("Pages:        0 patched, 1 missing, 0 unrecognized"));
        assert!(out.contains("Branches:     1/2 (50%)"));
        assert!(dataset.exists());
    }
}
