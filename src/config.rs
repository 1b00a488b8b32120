//! Settings of one overlay run.
//!
//! A `Config` can be loaded from a JSON file; the command line overrides
//! individual fields on top of it.
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dataset::DEFAULT_EXCLUDE;
use crate::error::Result;
use crate::tree::DEFAULT_LEAF_SUFFIX;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Branch/path dataset (JSON).
    pub dataset: PathBuf,
    /// Root of the rendered HTML report.
    pub output_dir: PathBuf,
    /// Clover XML summary to patch, if any.
    pub clover: Option<PathBuf>,
    /// Prefix stripped from dataset paths to find their pages under
    /// `output_dir`. When unset, the longest common directory of the
    /// dataset's files is used.
    pub source_root: Option<PathBuf>,
    /// Files whose path contains this marker are ignored.
    pub exclude: String,
    /// File name suffix of pages rendered for source files.
    pub leaf_suffix: String,
    /// Keep a copy of the Clover summary next to it before patching.
    pub backup: bool,
    /// Delete the dataset after a run without failures.
    pub remove_dataset: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("data.json"),
            output_dir: PathBuf::from("coverage"),
            clover: None,
            source_root: None,
            exclude: DEFAULT_EXCLUDE.to_string(),
            leaf_suffix: DEFAULT_LEAF_SUFFIX.to_string(),
            backup: false,
            remove_dataset: true,
        }
    }
}

impl Config {
    /// Load a config file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }
}
