//! Tree node and file reference types

use std::path::{Path, PathBuf};

/// One filesystem entry bound to a tree node.
///
/// `name` is the display name and is rewritten on every sync pass by
/// resetting it to `original_name` and running the mangle-hook chain, so
/// decorations never accumulate across refreshes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    /// Entry name as it appears on disk
    pub original_name: String,
    /// Display name (markup included) after the mangle chain
    pub name: String,
    /// Join of the parent path and the entry name
    pub path: PathBuf,
    /// Whether the entry is a directory, with one level of symlink resolved
    pub is_dir: bool,
}

impl FileReference {
    /// Create a reference for an entry before any mangling has run
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, is_dir: bool) -> Self {
        let name = name.into();
        Self {
            original_name: name.clone(),
            name,
            path: path.into(),
            is_dir,
        }
    }
}

/// Display-name accumulator threaded through the ordered mangle-hook chain.
///
/// Each hook receives the file reference plus the mangling-so-far and
/// returns an updated mangling. Created fresh per node per sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMangling {
    pub name: String,
    pub color: String,
    pub prefix: String,
    pub prefix_color: String,
    pub suffix: String,
    pub suffix_color: String,
}

impl NodeMangling {
    /// Seed the chain with the entry's on-disk name
    pub fn seed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Render the final display string.
    ///
    /// Segments are `[color]text[-]`, with the color brackets omitted when
    /// the corresponding color field is empty.
    pub fn display(&self) -> String {
        let mut out = String::new();
        push_segment(&mut out, &self.prefix, &self.prefix_color);
        push_segment(&mut out, &self.name, &self.color);
        push_segment(&mut out, &self.suffix, &self.suffix_color);
        out
    }
}

fn push_segment(out: &mut String, text: &str, color: &str) {
    if text.is_empty() {
        return;
    }
    if color.is_empty() {
        out.push_str(text);
    } else {
        out.push('[');
        out.push_str(color);
        out.push(']');
        out.push_str(text);
        out.push_str("[-]");
    }
}

/// A node in the in-memory file tree.
///
/// A freshly created node has no reference attached; the sync engine stats
/// the path and attaches one on the first pass. A node whose path is
/// unchanged across a sync keeps its value (children and expansion state
/// included), which is what preserves UI state through refreshes.
#[derive(Debug, Default)]
pub struct TreeNode {
    /// Filesystem entry backing this node, attached on first sync
    pub reference: Option<FileReference>,
    /// Whether the node's children are shown
    pub expanded: bool,
    children: Vec<TreeNode>,
}

impl TreeNode {
    /// Create an empty, unsynced node
    pub fn new() -> Self {
        Self::default()
    }

    /// Get children (immutable)
    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    /// Get children (mutable)
    pub fn children_mut(&mut self) -> &mut Vec<TreeNode> {
        &mut self.children
    }

    /// Path of the backing entry, if synced
    pub fn path(&self) -> Option<&Path> {
        self.reference.as_ref().map(|r| r.path.as_path())
    }

    /// Drop all children (used when the root directory changes)
    pub fn clear_children(&mut self) {
        self.children.clear();
    }

    /// Collapse this node and every descendant
    pub fn collapse_all(&mut self) {
        self.expanded = false;
        for child in &mut self.children {
            child.collapse_all();
        }
    }

    /// Find the node backing a path, depth first
    pub fn find_mut(&mut self, path: &Path) -> Option<&mut TreeNode> {
        if self.path() == Some(path) {
            return Some(self);
        }
        for child in &mut self.children {
            if let Some(found) = child.find_mut(path) {
                return Some(found);
            }
        }
        None
    }

    /// Flatten the visible part of the subtree into (node, depth) pairs,
    /// children shown only under expanded nodes
    pub fn visible_entries(&self) -> Vec<(&TreeNode, usize)> {
        let mut out = Vec::new();
        if self.expanded {
            for child in &self.children {
                child.collect_visible(0, &mut out);
            }
        }
        out
    }

    fn collect_visible<'a>(&'a self, depth: usize, out: &mut Vec<(&'a TreeNode, usize)>) {
        out.push((self, depth));
        if self.expanded {
            for child in &self.children {
                child.collect_visible(depth + 1, out);
            }
        }
    }
}
