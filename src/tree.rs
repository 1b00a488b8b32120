//! Bottom-up branch totals for the rendered output tree.
//!
//! The tree mirrors the output directory. Leaves are file pages whose totals
//! are read back out of their already-patched `Total` row; a directory's
//! aggregate is the sum of its children and is fixed when the directory node
//! is built, which can only happen once all children exist.
use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::Result;
use crate::model::Aggregate;
use crate::patch::html;

/// Default suffix of file pages rendered for source files.
pub const DEFAULT_LEAF_SUFFIX: &str = ".php.html";

/// Navigation pages that never count as leaves.
const NAVIGATION_PAGES: &[&str] = &["index.html", "dashboard.html"];

/// One node of the aggregate tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    Leaf {
        name: String,
        aggregate: Aggregate,
    },
    Directory {
        name: String,
        aggregate: Aggregate,
        children: BTreeMap<String, TreeNode>,
    },
}

impl TreeNode {
    pub fn leaf(name: impl Into<String>, aggregate: Aggregate) -> Self {
        TreeNode::Leaf {
            name: name.into(),
            aggregate,
        }
    }

    /// Build a directory from its finished children.
    pub fn directory(name: impl Into<String>, children: impl IntoIterator<Item = TreeNode>) -> Self {
        let children: BTreeMap<String, TreeNode> = children
            .into_iter()
            .map(|child| (child.name().to_string(), child))
            .collect();
        let aggregate = children.values().map(TreeNode::aggregate).sum();
        TreeNode::Directory {
            name: name.into(),
            aggregate,
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TreeNode::Leaf { name, .. } | TreeNode::Directory { name, .. } => name,
        }
    }

    pub fn aggregate(&self) -> Aggregate {
        match self {
            TreeNode::Leaf { aggregate, .. } | TreeNode::Directory { aggregate, .. } => *aggregate,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, TreeNode::Directory { .. })
    }

    /// Direct child by entry name (`"src"`, `"A.php.html"`).
    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        match self {
            TreeNode::Directory { children, .. } => children.get(name),
            TreeNode::Leaf { .. } => None,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &TreeNode> {
        let children = match self {
            TreeNode::Directory { children, .. } => Some(children.values()),
            TreeNode::Leaf { .. } => None,
        };
        children.into_iter().flatten()
    }

    /// Follow a `/`-separated path of entry names from this node.
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| node.child(segment))
    }
}

/// Build the aggregate tree for the output directory `root`.
pub fn build_tree(root: &Path, leaf_suffix: &str) -> Result<TreeNode> {
    let name = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let children = read_children(root, leaf_suffix)?;
    Ok(TreeNode::directory(name, children))
}

fn read_children(dir: &Path, leaf_suffix: &str) -> Result<Vec<TreeNode>> {
    let mut children = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };

        if path.is_dir() {
            let grandchildren = match read_children(&path, leaf_suffix) {
                Ok(nodes) => nodes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not read output directory");
                    Vec::new()
                }
            };
            children.push(TreeNode::directory(name, grandchildren));
        } else if name.ends_with(leaf_suffix) && !NAVIGATION_PAGES.contains(&name.as_str()) {
            let aggregate = read_leaf(&path);
            children.push(TreeNode::leaf(name, aggregate));
        }
    }
    Ok(children)
}

/// Totals of one file page; zero when unreadable or not yet patched.
fn read_leaf(path: &Path) -> Aggregate {
    match std::fs::read_to_string(path) {
        Ok(content) => html::read_total(&content).unwrap_or_else(|| {
            debug!(path = %path.display(), "no branch totals in page");
            Aggregate::default()
        }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read page");
            Aggregate::default()
        }
    }
}
