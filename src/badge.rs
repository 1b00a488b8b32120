//! Turns a hit/total pair into the percentage, severity class and table
//! cells shown in the "Branches" column group.
use std::fmt;

use crate::model::{percentage, Aggregate};

/// Attribute carried by every cell this crate appends to a report, so later
/// runs can find and replace them.
pub const MARKER_ATTR: &str = r#"data-coverage="branch""#;

/// Coloring tier, matching the thresholds of the rest of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Danger,
    Warning,
    Success,
}

impl Severity {
    #[must_use]
    pub fn from_percentage(pct: f64) -> Self {
        if pct < 50.0 {
            Severity::Danger
        } else if pct < 100.0 {
            Severity::Warning
        } else {
            Severity::Success
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Danger => "danger",
            Severity::Warning => "warning",
            Severity::Success => "success",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a percentage with at most two decimals and no trailing zeros:
/// `33.33`, `12.5`, `50`, `100`.
#[must_use]
pub fn format_percentage(pct: f64) -> String {
    let s = format!("{pct:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Derived presentation of an [`Aggregate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Badge {
    pub hit: u64,
    pub total: u64,
    pub percentage: f64,
    pub severity: Severity,
}

impl Badge {
    #[must_use]
    pub fn new(hit: u64, total: u64) -> Self {
        let percentage = percentage(hit, total);
        Self {
            hit,
            total,
            percentage,
            severity: Severity::from_percentage(percentage),
        }
    }

    /// The three cells appended to a table row: progress bar, percentage
    /// text, and `hit / total`.
    #[must_use]
    pub fn fragment(&self) -> String {
        let style = self.severity.as_str();
        let pct = format_percentage(self.percentage);
        let hit = self.hit;
        let total = self.total;
        format!(
            concat!(
                r#"<td class="{style} big" {marker}><div class="progress">"#,
                r#"<div class="progress-bar progress-bar-{style}" role="progressbar" aria-valuenow="{pct}" aria-valuemin="0" aria-valuemax="100" style="width: {pct}%">"#,
                r#"<span class="sr-only">{pct}% covered ({style})</span></div></div></td>"#,
                r#"<td class="{style} small" {marker}><div align="right">{pct}%</div></td>"#,
                r#"<td class="{style} small" {marker}><div align="right">{hit}&nbsp;/&nbsp;{total}</div></td>"#,
            ),
            style = style,
            marker = MARKER_ATTR,
            pct = pct,
            hit = hit,
            total = total,
        )
    }
}

impl From<Aggregate> for Badge {
    fn from(agg: Aggregate) -> Self {
        Badge::new(agg.hit_count, agg.branch_count)
    }
}
