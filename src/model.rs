//! Derived counts shared by the aggregators, the annotators and the report
//! patchers. Nothing here is persisted; every value is recomputed from the
//! dataset on each run.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Coverage percentage rounded to two decimals. An empty total counts as
/// fully covered.
#[must_use]
pub fn percentage(hit: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (hit as f64 * 100.0 / total as f64 * 100.0).round() / 100.0
    }
}

/// Hit/total counts for a function, a file, a directory or the project.
///
/// The same shape carries path counts; `branch_count` then counts paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub hit_count: u64,
    pub branch_count: u64,
}

impl Aggregate {
    #[must_use]
    pub fn new(hit_count: u64, branch_count: u64) -> Self {
        Self {
            hit_count,
            branch_count,
        }
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        percentage(self.hit_count, self.branch_count)
    }

    /// True when every counted hit is backed by a counted branch.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.hit_count <= self.branch_count
    }
}

impl Add for Aggregate {
    type Output = Aggregate;

    fn add(self, rhs: Aggregate) -> Aggregate {
        Aggregate {
            hit_count: self.hit_count + rhs.hit_count,
            branch_count: self.branch_count + rhs.branch_count,
        }
    }
}

impl AddAssign for Aggregate {
    fn add_assign(&mut self, rhs: Aggregate) {
        self.hit_count += rhs.hit_count;
        self.branch_count += rhs.branch_count;
    }
}

impl Sum for Aggregate {
    fn sum<I: Iterator<Item = Aggregate>>(iter: I) -> Self {
        iter.fold(Aggregate::default(), Add::add)
    }
}

impl<'a> Sum<&'a Aggregate> for Aggregate {
    fn sum<I: Iterator<Item = &'a Aggregate>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Branches starting on a single source line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineAggregate {
    /// Number of distinct branches whose `line_start` is this line.
    pub count: u64,
    /// Sum of their hit counts.
    pub hit: u64,
}
