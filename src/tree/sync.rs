//! Tree synchronization engine
//!
//! Reconciles a node's children against the live directory listing in
//! place. Nodes whose paths are still present keep their identity, so
//! expansion and selection state survive a refresh. Plugin hooks from the
//! snapshot are applied along the way: mangle for display names, filter
//! for new entries, sort over the reconciled child list.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::node::{FileReference, NodeMangling, TreeNode};
use crate::error::Result;
use crate::plugin::HookSnapshot;

/// The currently selected path, tracked across sync passes.
///
/// When the selected node is removed, the engine reassigns the selection
/// to a surviving sibling before dropping it, so the UI is never left
/// pointing at a detached node.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    current: Option<PathBuf>,
}

impl Selection {
    /// Create an empty selection
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the selection at a path
    pub fn select(&mut self, path: impl Into<PathBuf>) {
        self.current = Some(path.into());
    }

    /// Drop the selection
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// The selected path, if any
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }
}

/// Synchronize one node (and, recursively, its expanded subtree) with the
/// filesystem path it represents.
///
/// A node without an attached reference is stat'ed first; failure of that
/// initial stat fails the whole sync. Child-level failures degrade to
/// warnings so one unreadable subtree cannot take down a refresh.
pub fn sync_node(
    node: &mut TreeNode,
    path: &Path,
    should_expand: bool,
    hooks: &HookSnapshot,
    selection: &mut Selection,
) -> Result<()> {
    let mut reference = match node.reference.take() {
        Some(reference) => reference,
        None => stat_reference(path)?,
    };

    // The display name never accumulates: reset to the on-disk name, then
    // run the full mangle chain.
    reference.name = mangle(&reference, hooks);
    let is_dir = reference.is_dir;
    let node_path = reference.path.clone();
    node.reference = Some(reference);
    node.expanded = should_expand;

    if !is_dir || !node.expanded {
        return Ok(());
    }

    let entries = list_directory(&node_path)?;
    let listed: HashSet<&Path> = entries.iter().map(|e| e.path.as_path()).collect();

    // Partition existing children into still-present and removed.
    let removed: Vec<bool> = node
        .children()
        .iter()
        .map(|child| !child.path().is_some_and(|p| listed.contains(p)))
        .collect();

    reassign_selection(node, &removed, selection);

    let mut index = 0;
    node.children_mut().retain(|_| {
        let keep = !removed[index];
        index += 1;
        keep
    });

    // Re-sync survivors against their own expansion state.
    for child in node.children_mut() {
        let Some(child_path) = child.path().map(Path::to_path_buf) else {
            continue;
        };
        let expanded = child.expanded;
        if let Err(e) = sync_node(child, &child_path, expanded, hooks, selection) {
            warn!(path = %child_path.display(), error = %e, "child sync failed");
        }
    }

    // New entries are those without a matching child by path equality,
    // kept only if every filter hook accepts them.
    let existing: HashSet<PathBuf> = node
        .children()
        .iter()
        .filter_map(|c| c.path().map(Path::to_path_buf))
        .collect();
    for entry in entries {
        if existing.contains(&entry.path) || !passes_filters(&entry, hooks) {
            continue;
        }
        let entry_path = entry.path.clone();
        let mut child = TreeNode::new();
        child.reference = Some(entry);
        if let Err(e) = sync_node(&mut child, &entry_path, false, hooks, selection) {
            warn!(path = %entry_path.display(), error = %e, "new entry sync failed");
            continue;
        }
        node.children_mut().push(child);
    }

    sort_children(node, hooks);
    Ok(())
}

/// Run the ordered mangle chain over a reference and render the display
/// string. A failing hook contributes nothing; the rest still run.
pub fn mangle(reference: &FileReference, hooks: &HookSnapshot) -> String {
    let mut mangling = NodeMangling::seed(&reference.original_name);
    for hook in &hooks.mangle {
        match hook(reference, mangling.clone()) {
            Ok(next) => mangling = next,
            Err(e) => {
                warn!(path = %reference.path.display(), error = %e, "mangle hook failed");
            }
        }
    }
    mangling.display()
}

fn reassign_selection(node: &TreeNode, removed: &[bool], selection: &mut Selection) {
    let Some(selected) = selection.current().map(Path::to_path_buf) else {
        return;
    };
    for (i, child) in node.children().iter().enumerate() {
        if !(removed[i] && child.path() == Some(selected.as_path())) {
            continue;
        }
        // Prefer the next surviving sibling, then the previous one.
        let next = (i + 1..node.children().len()).find(|&j| !removed[j]);
        let previous = (0..i).rev().find(|&j| !removed[j]);
        match next
            .or(previous)
            .and_then(|j| node.children()[j].path().map(Path::to_path_buf))
        {
            Some(sibling) => selection.select(sibling),
            None => selection.clear(),
        }
        return;
    }
}

fn passes_filters(entry: &FileReference, hooks: &HookSnapshot) -> bool {
    for hook in &hooks.filter {
        match hook(entry) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "filter hook failed");
            }
        }
    }
    true
}

fn sort_children(node: &mut TreeNode, hooks: &HookSnapshot) {
    if hooks.sort.is_empty() {
        return;
    }
    // One stable sort with the comparators chained in registration order:
    // the first hook is primary and later hooks only break its ties.
    node.children_mut().sort_by(|a, b| {
        let (Some(ra), Some(rb)) = (a.reference.as_ref(), b.reference.as_ref()) else {
            return std::cmp::Ordering::Equal;
        };
        for hook in &hooks.sort {
            match hook(ra, rb) {
                Ok(std::cmp::Ordering::Equal) => continue,
                Ok(order) => return order,
                Err(e) => {
                    warn!(error = %e, "sort hook failed");
                }
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn stat_reference(path: &Path) -> Result<FileReference> {
    let meta = fs::symlink_metadata(path)?;
    let is_dir = if meta.file_type().is_symlink() {
        fs::metadata(path)?.is_dir()
    } else {
        meta.is_dir()
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    Ok(FileReference::new(name, path, is_dir))
}

fn list_directory(path: &Path) -> Result<Vec<FileReference>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = path.join(entry.file_name());
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let is_dir = if file_type.is_symlink() {
            // Follow the link to decide directory-ness; entries that do
            // not resolve are skipped, not retried.
            match fs::metadata(&entry_path) {
                Ok(meta) => meta.is_dir(),
                Err(_) => continue,
            }
        } else {
            file_type.is_dir()
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        out.push(FileReference::new(name, entry_path, is_dir));
    }
    // Directory iteration order is not stable; name order keeps a no-op
    // sync from reshuffling children.
    out.sort_by(|a, b| a.original_name.cmp(&b.original_name));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{FilterFn, MangleFn, SortFn};
    use std::rc::Rc;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) {
        fs::write(dir.path().join(name), b"").unwrap();
    }

    fn synced_root(dir: &TempDir, hooks: &HookSnapshot, selection: &mut Selection) -> TreeNode {
        let mut root = TreeNode::new();
        sync_node(&mut root, dir.path(), true, hooks, selection).unwrap();
        root
    }

    fn child_names(node: &TreeNode) -> Vec<String> {
        node.children()
            .iter()
            .filter_map(|c| c.reference.as_ref().map(|r| r.original_name.clone()))
            .collect()
    }

    #[test]
    fn test_initial_sync_lists_entries() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "b.txt");
        touch(&temp, "a.txt");
        fs::create_dir(temp.path().join("sub")).unwrap();

        let root = synced_root(&temp, &HookSnapshot::default(), &mut Selection::new());
        assert_eq!(child_names(&root), ["a.txt", "b.txt", "sub"]);
    }

    #[test]
    fn test_initial_stat_failure_fails_sync() {
        let temp = TempDir::new().unwrap();
        let mut root = TreeNode::new();
        let missing = temp.path().join("gone");
        let result = sync_node(
            &mut root,
            &missing,
            true,
            &HookSnapshot::default(),
            &mut Selection::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unexpanded_directories_stay_lazy() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        touch(&temp, "sub/inner.txt");

        let root = synced_root(&temp, &HookSnapshot::default(), &mut Selection::new());
        assert!(root.children()[0].children().is_empty());
    }

    #[test]
    fn test_expanded_subtree_keeps_state_across_syncs() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        touch(&temp, "sub/inner.txt");

        let hooks = HookSnapshot::default();
        let mut selection = Selection::new();
        let mut root = synced_root(&temp, &hooks, &mut selection);

        root.children_mut()[0].expanded = true;
        sync_node(&mut root, temp.path(), true, &hooks, &mut selection).unwrap();
        assert_eq!(child_names(&root.children()[0]), ["inner.txt"]);

        // A second no-op sync leaves the expanded subtree in place.
        sync_node(&mut root, temp.path(), true, &hooks, &mut selection).unwrap();
        assert!(root.children()[0].expanded);
        assert_eq!(child_names(&root.children()[0]), ["inner.txt"]);
    }

    #[test]
    fn test_selection_moves_to_next_sibling() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "a.txt");
        touch(&temp, "b.txt");
        touch(&temp, "c.txt");

        let hooks = HookSnapshot::default();
        let mut selection = Selection::new();
        let mut root = synced_root(&temp, &hooks, &mut selection);

        selection.select(temp.path().join("b.txt"));
        fs::remove_file(temp.path().join("b.txt")).unwrap();
        sync_node(&mut root, temp.path(), true, &hooks, &mut selection).unwrap();

        assert_eq!(
            selection.current(),
            Some(temp.path().join("c.txt").as_path())
        );
    }

    #[test]
    fn test_selection_falls_back_to_previous_sibling() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "a.txt");
        touch(&temp, "b.txt");

        let hooks = HookSnapshot::default();
        let mut selection = Selection::new();
        let mut root = synced_root(&temp, &hooks, &mut selection);

        selection.select(temp.path().join("b.txt"));
        fs::remove_file(temp.path().join("b.txt")).unwrap();
        sync_node(&mut root, temp.path(), true, &hooks, &mut selection).unwrap();

        assert_eq!(
            selection.current(),
            Some(temp.path().join("a.txt").as_path())
        );
    }

    #[test]
    fn test_selection_cleared_when_no_siblings_survive() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "only.txt");

        let hooks = HookSnapshot::default();
        let mut selection = Selection::new();
        let mut root = synced_root(&temp, &hooks, &mut selection);

        selection.select(temp.path().join("only.txt"));
        fs::remove_file(temp.path().join("only.txt")).unwrap();
        sync_node(&mut root, temp.path(), true, &hooks, &mut selection).unwrap();

        assert_eq!(selection.current(), None);
    }

    #[test]
    fn test_filters_apply_to_new_entries_only() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "keep.log");

        let hooks = HookSnapshot::default();
        let mut selection = Selection::new();
        let mut root = synced_root(&temp, &hooks, &mut selection);
        assert_eq!(child_names(&root), ["keep.log"]);

        // A filter rejecting .log files hides new ones but does not evict
        // the node that is already in the tree.
        let reject_logs: FilterFn =
            Rc::new(|r: &FileReference| Ok(!r.original_name.ends_with(".log")));
        let hooks = HookSnapshot {
            filter: vec![reject_logs],
            ..Default::default()
        };
        touch(&temp, "new.log");
        touch(&temp, "new.txt");
        sync_node(&mut root, temp.path(), true, &hooks, &mut selection).unwrap();
        assert_eq!(child_names(&root), ["keep.log", "new.txt"]);
    }

    #[test]
    fn test_entry_kept_only_if_every_filter_accepts() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "a.txt");
        touch(&temp, "b.txt");

        let accept_all: FilterFn = Rc::new(|_: &FileReference| Ok(true));
        let reject_b: FilterFn = Rc::new(|r: &FileReference| Ok(r.original_name != "b.txt"));
        let hooks = HookSnapshot {
            filter: vec![accept_all, reject_b],
            ..Default::default()
        };
        let root = synced_root(&temp, &hooks, &mut Selection::new());
        assert_eq!(child_names(&root), ["a.txt"]);
    }

    #[test]
    fn test_mangle_left_fold_is_order_dependent() {
        // Two non-commutative hooks: appending to the name and wrapping it.
        let append: MangleFn = Rc::new(|_: &FileReference, mut m: NodeMangling| {
            m.name.push('!');
            Ok(m)
        });
        let wrap: MangleFn = Rc::new(|_: &FileReference, mut m: NodeMangling| {
            m.name = format!("<{}>", m.name);
            Ok(m)
        });

        let reference = FileReference::new("f", "/r/f", false);

        let forward = HookSnapshot {
            mangle: vec![append.clone(), wrap.clone()],
            ..Default::default()
        };
        let reverse = HookSnapshot {
            mangle: vec![wrap, append],
            ..Default::default()
        };

        assert_eq!(mangle(&reference, &forward), "<f!>");
        assert_eq!(mangle(&reference, &reverse), "<f>!");
    }

    #[test]
    fn test_mangled_name_does_not_accumulate() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "a.txt");

        let suffix: MangleFn = Rc::new(|_: &FileReference, mut m: NodeMangling| {
            m.suffix = "*".to_string();
            Ok(m)
        });
        let hooks = HookSnapshot {
            mangle: vec![suffix],
            ..Default::default()
        };

        let mut selection = Selection::new();
        let mut root = synced_root(&temp, &hooks, &mut selection);
        sync_node(&mut root, temp.path(), true, &hooks, &mut selection).unwrap();
        sync_node(&mut root, temp.path(), true, &hooks, &mut selection).unwrap();

        let reference = root.children()[0].reference.as_ref().unwrap();
        assert_eq!(reference.name, "a.txt*");
    }

    #[test]
    fn test_failing_mangle_hook_does_not_block_others() {
        let broken: MangleFn = Rc::new(|_: &FileReference, _: NodeMangling| {
            Err(crate::error::LarchError::decode("bad hook"))
        });
        let suffix: MangleFn = Rc::new(|_: &FileReference, mut m: NodeMangling| {
            m.suffix = "*".to_string();
            Ok(m)
        });
        let hooks = HookSnapshot {
            mangle: vec![broken, suffix],
            ..Default::default()
        };
        let reference = FileReference::new("f", "/r/f", false);
        assert_eq!(mangle(&reference, &hooks), "f*");
    }

    #[test]
    fn test_sort_first_hook_primary_later_hooks_break_ties() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "b.txt");
        touch(&temp, "a.txt");
        fs::create_dir(temp.path().join("zdir")).unwrap();

        // Primary: directories first. Secondary: reverse name order.
        let dirs_first: SortFn = Rc::new(|a: &FileReference, b: &FileReference| {
            Ok(b.is_dir.cmp(&a.is_dir))
        });
        let reverse_name: SortFn = Rc::new(|a: &FileReference, b: &FileReference| {
            Ok(b.original_name.cmp(&a.original_name))
        });
        let hooks = HookSnapshot {
            sort: vec![dirs_first, reverse_name],
            ..Default::default()
        };

        let root = synced_root(&temp, &hooks, &mut Selection::new());
        assert_eq!(child_names(&root), ["zdir", "b.txt", "a.txt"]);
    }

    #[test]
    fn test_noop_sync_is_order_idempotent() {
        let temp = TempDir::new().unwrap();
        touch(&temp, "one.txt");
        touch(&temp, "two.txt");
        touch(&temp, "three.txt");

        // All entries rank equal under the only sort hook; their relative
        // order must settle and stay put across repeated syncs.
        let all_equal: SortFn =
            Rc::new(|_: &FileReference, _: &FileReference| Ok(std::cmp::Ordering::Equal));
        let hooks = HookSnapshot {
            sort: vec![all_equal],
            ..Default::default()
        };

        let mut selection = Selection::new();
        let mut root = synced_root(&temp, &hooks, &mut selection);
        let first = child_names(&root);
        sync_node(&mut root, temp.path(), true, &hooks, &mut selection).unwrap();
        assert_eq!(child_names(&root), first);
        sync_node(&mut root, temp.path(), true, &hooks, &mut selection).unwrap();
        assert_eq!(child_names(&root), first);
    }
}
