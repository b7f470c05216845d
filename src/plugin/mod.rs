//! Plugin system
//!
//! Scripting backends ("systems") load user-supplied scripts and expose
//! their hooks to the rest of the program through the registry's
//! aggregated snapshots.
//!
//! # Plugin location
//!
//! Each system reads `~/.config/larch/plugins/<system>/`; a subdirectory
//! containing `init.lua`, or a bare `*.lua` file, becomes one plugin.
//!
//! # Module contract
//!
//! A plugin returns a table of exports. Recognized names: `edicts`,
//! `permissions`, `exec`, `popup`, `refreshTree`, `focusTree`,
//! `focusLocation`, `focusInput`, `mangleTreeNode`, `sortTreeNode`,
//! `filterTreeNode`, `onInit`, `onTreeRefresh`, `binds`. Anything else is
//! ignored so older releases tolerate newer plugins.
//!
//! ```lua
//! -- ~/.config/larch/plugins/lua/marker.lua
//! local M = { permissions = { exec = { "git" } }, exec = false }
//! M.mangleTreeNode = function(ref, m)
//!     if ref.IsDirectory then m.Suffix = "/" end
//!     return m
//! end
//! return M
//! ```

mod api;
mod bridge;
mod hooks;
mod lua;
mod registry;
mod sandbox;

pub use api::{CommandQueue, UiCommand};
pub use hooks::{FilterFn, LifecycleFn, MangleFn, PluginHooks, PluginState, SortFn};
pub use lua::{load_all, LuaPlugin, LuaSystem, ENTRY_POINT};
pub use registry::{system_dir, HookSnapshot, System, SystemRegistry};
pub use sandbox::PermissionSet;
