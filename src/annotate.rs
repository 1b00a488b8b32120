//! Merges per-line branch counts into the line records of an existing
//! report.
//!
//! A report line ends a pass with an explicit branch marker. Coverage fields
//! are only ever written when unset, so annotating twice is the same as
//! annotating once.
use std::collections::BTreeMap;

use crate::dataset::FileEntry;
use crate::model::LineAggregate;

/// Branch attributes of one report line, as read from (and written back to)
/// the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineBranch {
    /// `branch` marker: `None` when the report has not marked the line yet.
    pub marker: Option<bool>,
    /// `coveredbranch`: summed hits of the branches starting on this line.
    pub covered: Option<u64>,
    /// `branchcount`: number of branches starting on this line.
    pub count: Option<u64>,
}

/// One line record of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLine {
    pub num: u32,
    pub branch: LineBranch,
}

/// Bucket every branch of every function in `file` by its starting line.
#[must_use]
pub fn line_aggregates(file: &FileEntry) -> BTreeMap<u32, LineAggregate> {
    let mut lines: BTreeMap<u32, LineAggregate> = BTreeMap::new();
    for function in file.functions.values() {
        for branch in &function.branches {
            let entry = lines.entry(branch.line_start).or_default();
            entry.count += 1;
            entry.hit += branch.hit;
        }
    }
    lines
}

/// Apply a line's aggregate (if any) to its branch attributes. Returns
/// whether anything changed.
pub fn annotate_line(line: &mut LineBranch, aggregate: Option<&LineAggregate>) -> bool {
    let before = *line;
    match aggregate {
        Some(agg) => {
            line.marker = Some(true);
            if line.covered.is_none() {
                line.covered = Some(agg.hit);
                line.count = Some(agg.count);
            }
        }
        None => {
            if line.marker.is_none() {
                line.marker = Some(false);
            }
        }
    }
    *line != before
}

/// Annotate every line of a report with the branches recorded for its file.
/// Lines recorded in the dataset but absent from `lines` are not added.
pub fn annotate(lines: &mut [ReportLine], file: &FileEntry) {
    let aggregates = line_aggregates(file);
    for line in lines.iter_mut() {
        annotate_line(&mut line.branch, aggregates.get(&line.num));
    }
}
