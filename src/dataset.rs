//! Typed view over the raw branch/path execution dataset.
//!
//! The dataset is a JSON object keyed by absolute source path:
//!
//!   {
//!     "/src/A.php": {
//!       "functions": {
//!         "A->m": {
//!           "branches": [{"line_start": 10, "hit": 1}],
//!           "paths": [{"hit": 1}]
//!         }
//!       }
//!     }
//!   }
//!
//! Missing or `null` `functions`, `branches`, `paths`, `line_start` or `hit`
//! values all read as empty or zero. PHP's `json_encode` writes an empty
//! array as `[]` and a sparse one as an object, so every collection accepts
//! both shapes. Files whose path contains the exclusion marker are
//! dropped while loading and never seen by the aggregators.
use std::collections::BTreeMap;
use std::path::Path;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::Result;

/// Default exclusion marker: third-party dependency trees.
pub const DEFAULT_EXCLUDE: &str = "vendor";

/// One conditional branch occurrence inside a function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct BranchRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub line_start: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hit: u64,
}

/// One execution path through a function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PathRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub hit: u64,
}

/// A function or method (`Class->method`) and its recorded branches/paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionEntry {
    #[serde(default, deserialize_with = "records")]
    pub branches: Vec<BranchRecord>,
    #[serde(default, deserialize_with = "records")]
    pub paths: Vec<PathRecord>,
}

/// All functions recorded for one source file, keyed by function name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileEntry {
    #[serde(default, deserialize_with = "named_entries")]
    pub functions: BTreeMap<String, FunctionEntry>,
}

/// The filtered dataset, keyed by absolute source path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchDataset {
    files: BTreeMap<String, FileEntry>,
}

impl BranchDataset {
    /// Build a dataset from already-parsed entries, dropping every path that
    /// contains `exclude`. An empty marker excludes nothing.
    pub fn new(files: BTreeMap<String, FileEntry>, exclude: &str) -> Self {
        let files = files
            .into_iter()
            .filter(|(path, _)| {
                let excluded = !exclude.is_empty() && path.contains(exclude);
                if excluded {
                    debug!(path = %path, "excluding file from branch dataset");
                }
                !excluded
            })
            .collect();
        Self { files }
    }

    /// Parse the JSON dataset from raw bytes.
    ///
    /// A top-level JSON `null` or `[]` (what an empty collector run emits)
    /// reads as an empty dataset.
    pub fn from_slice(input: &[u8], exclude: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(input)?;
        let files = match value {
            serde_json::Value::Null => BTreeMap::new(),
            serde_json::Value::Array(ref items) if items.is_empty() => BTreeMap::new(),
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(path, entry)| Ok((path, parse_file_entry(entry)?)))
                .collect::<Result<_>>()?,
            other => serde_json::from_value(other)?,
        };
        Ok(Self::new(files, exclude))
    }

    /// Read and parse the dataset file at `path`.
    pub fn load(path: &Path, exclude: &str) -> Result<Self> {
        let content = std::fs::read(path)?;
        Self::from_slice(&content, exclude)
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &FileEntry)> {
        self.files.iter().map(|(path, entry)| (path.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A file value that is not an object (e.g. `null`) still yields an entry
/// with no functions.
fn parse_file_entry(value: serde_json::Value) -> Result<FileEntry> {
    if value.is_object() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(FileEntry::default())
    }
}

/// Either JSON shape of a PHP array.
#[derive(Deserialize)]
#[serde(untagged)]
enum PhpArray<T> {
    List(Vec<Option<T>>),
    Map(BTreeMap<String, Option<T>>),
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Records in document order; `null` records are skipped.
fn records<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let records = match Option::<PhpArray<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(PhpArray::List(items)) => items.into_iter().flatten().collect(),
        Some(PhpArray::Map(items)) => items.into_values().flatten().collect(),
    };
    Ok(records)
}

/// Entries keyed by name. An empty list is an empty map; a `null` entry
/// reads as an empty one.
fn named_entries<'de, D, T>(deserializer: D) -> std::result::Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entries<T> {
        Map(BTreeMap<String, Option<T>>),
        List(Vec<IgnoredAny>),
    }

    let entries = match Option::<Entries<T>>::deserialize(deserializer)? {
        Some(Entries::Map(items)) => items
            .into_iter()
            .map(|(name, entry)| (name, entry.unwrap_or_default()))
            .collect(),
        Some(Entries::List(_)) | None => BTreeMap::new(),
    };
    Ok(entries)
}
