//! larch - a plugin-extensible file tree browser for terminal emulators
//!
//! The tree, the command pipeline, and the display pipeline are all
//! extensible through Lua plugins loaded from the user's config directory.

pub mod app;
pub mod edict;
pub mod error;
pub mod plugin;
pub mod tree;
