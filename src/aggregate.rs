//! Reduces a [`BranchDataset`] into hit/total counts per function, per file
//! and for the whole project.
use std::collections::BTreeMap;

use crate::dataset::{BranchDataset, FunctionEntry};
use crate::model::Aggregate;

/// Row label that stands for the whole file (or directory).
pub const TOTAL_LABEL: &str = "Total";

/// Separator between a class name and a method name in function keys.
pub const METHOD_SEPARATOR: &str = "->";

/// Per-function aggregates of one file, keyed by function name.
pub type FunctionCounts = BTreeMap<String, Aggregate>;

/// Per-file function aggregates, keyed by source path.
pub type Counts = BTreeMap<String, FunctionCounts>;

/// Which record sequence of a function to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Branches,
    Paths,
}

impl Measure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Measure::Branches => "branches",
            Measure::Paths => "paths",
        }
    }

    /// Fold one function's records into an aggregate.
    #[must_use]
    pub fn count(&self, function: &FunctionEntry) -> Aggregate {
        match self {
            Measure::Branches => Aggregate {
                hit_count: function.branches.iter().map(|b| b.hit).sum(),
                branch_count: function.branches.len() as u64,
            },
            Measure::Paths => Aggregate {
                hit_count: function.paths.iter().map(|p| p.hit).sum(),
                branch_count: function.paths.len() as u64,
            },
        }
    }
}

/// Count every function of every included file.
#[must_use]
pub fn counts(dataset: &BranchDataset, measure: Measure) -> Counts {
    dataset
        .files()
        .map(|(path, file)| {
            let functions = file
                .functions
                .iter()
                .map(|(name, function)| (name.clone(), measure.count(function)))
                .collect();
            (path.to_string(), functions)
        })
        .collect()
}

/// Branch counts: file → function → aggregate.
#[must_use]
pub fn branch_counts(dataset: &BranchDataset) -> Counts {
    counts(dataset, Measure::Branches)
}

/// Path counts: file → function → aggregate.
#[must_use]
pub fn path_counts(dataset: &BranchDataset) -> Counts {
    counts(dataset, Measure::Paths)
}

/// Sum over all functions of `file`; zero when the file is unknown.
#[must_use]
pub fn file_total(counts: &Counts, file: &str) -> Aggregate {
    counts
        .get(file)
        .map(|functions| functions.values().sum())
        .unwrap_or_default()
}

/// Sum over every file.
#[must_use]
pub fn project_total(counts: &Counts) -> Aggregate {
    counts.values().flat_map(|functions| functions.values()).sum()
}

/// Whether `function` is attributed to the row `label`: an exact match, or a
/// method of the class `label`.
///
/// `"Foo->bar"` belongs to `"Foo"` but not to `"Foobar"`, and `"Foo"` does
/// not belong to `"Foo->bar"`.
#[must_use]
pub fn label_matches(function: &str, label: &str) -> bool {
    match function.strip_prefix(label) {
        Some("") => true,
        Some(rest) => rest.starts_with(METHOD_SEPARATOR),
        None => false,
    }
}

/// Aggregate of the functions of `file` attributed to `label`. The label
/// [`TOTAL_LABEL`] yields the whole-file aggregate.
#[must_use]
pub fn label_total(counts: &Counts, file: &str, label: &str) -> Aggregate {
    if label == TOTAL_LABEL {
        return file_total(counts, file);
    }
    counts
        .get(file)
        .map(|functions| {
            functions
                .iter()
                .filter(|(name, _)| label_matches(name, label))
                .map(|(_, agg)| *agg)
                .sum()
        })
        .unwrap_or_default()
}
