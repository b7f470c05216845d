//! Edict command pipeline
//!
//! An edict is a named command operating on a selected path and argument
//! tokens. Built-ins cover the filesystem basics; plugins register more
//! through the system registry, and a configured post-edict map chains
//! one edict into the next.

mod builtin;
mod context;
mod pipeline;

use std::rc::Rc;

pub use context::EdictContext;
pub use pipeline::Pipeline;

/// A runnable edict. Failures travel in the returned context's `err`.
pub type EdictFn = Rc<dyn Fn(EdictContext) -> EdictContext>;
