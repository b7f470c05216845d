//! Hook bundle types
//!
//! Every hook a plugin can provide is a tagged slot here, decoded once at
//! load time by the marshaling bridge. Nothing downstream touches the
//! scripting runtime directly; it only calls these closures.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::app::Bind;
use crate::edict::EdictFn;
use crate::error::Result;
use crate::tree::{FileReference, NodeMangling};

/// Rewrites a node's display mangling; receives the mangling-so-far
pub type MangleFn = Rc<dyn Fn(&FileReference, NodeMangling) -> Result<NodeMangling>>;

/// Three-way comparator over two entries
pub type SortFn = Rc<dyn Fn(&FileReference, &FileReference) -> Result<Ordering>>;

/// Accepts or rejects an entry; an entry survives only if every filter
/// accepts it
pub type FilterFn = Rc<dyn Fn(&FileReference) -> Result<bool>>;

/// Zero-argument lifecycle callback (onInit, onTreeRefresh)
pub type LifecycleFn = Rc<dyn Fn() -> Result<()>>;

/// The hooks one plugin declared, in its declaration order
#[derive(Default, Clone)]
pub struct PluginHooks {
    pub mangle: Option<MangleFn>,
    pub sort: Option<SortFn>,
    pub filter: Option<FilterFn>,
    pub on_init: Option<LifecycleFn>,
    pub on_tree_refresh: Option<LifecycleFn>,
    /// Named edicts in declaration order; later plugins override earlier
    /// ones of the same name at registry rebuild
    pub edicts: Vec<(String, EdictFn)>,
    /// Keybinding declarations merged into the global bind table
    pub binds: Vec<Bind>,
}

/// Load state of one plugin unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Discovered,
    Compiled,
    Evaluated,
    Active,
    Failed,
}
