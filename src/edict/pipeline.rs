//! Edict resolution and chaining

use std::collections::HashMap;
use std::rc::Rc;

use super::{builtin, EdictContext, EdictFn};
use crate::error::{LarchError, Result};

/// Resolves edict names and executes them against a context.
///
/// Plugin-registered edicts are looked up first and shadow built-ins of
/// the same name. After a successful invocation the post-edict map may
/// name a follow-up edict, which is run with the same selection and the
/// resulting arguments, the prior context wrapped as `previous`. The
/// chain carries an explicit depth counter and fails closed once the
/// configured bound is exceeded, so a chain naming itself terminates
/// with an error instead of recursing forever.
pub struct Pipeline {
    edicts: HashMap<String, EdictFn>,
    post_edicts: HashMap<String, String>,
    max_chain_depth: usize,
}

impl Pipeline {
    /// Create a pipeline with the built-in edicts registered
    pub fn new(post_edicts: HashMap<String, String>, max_chain_depth: usize) -> Self {
        let mut pipeline = Self {
            edicts: HashMap::new(),
            post_edicts,
            max_chain_depth,
        };
        pipeline.register("edit", Rc::new(builtin::edit));
        pipeline.register("open", Rc::new(builtin::open));
        pipeline.register("create", Rc::new(builtin::create));
        pipeline.register("mkdir", Rc::new(builtin::mkdir));
        pipeline.register("remove", Rc::new(builtin::remove));
        pipeline.register("rename", Rc::new(builtin::rename));
        pipeline.register("trash", Rc::new(builtin::trash));
        pipeline
    }

    /// Register an edict under a name, replacing any previous registration.
    /// The UI layer uses this for its own edicts (quit, fold-all).
    pub fn register(&mut self, name: impl Into<String>, edict: EdictFn) {
        self.edicts.insert(name.into(), edict);
    }

    /// Whether a name resolves, given the plugin edicts in effect
    pub fn has_edict(&self, name: &str, plugin_edicts: &HashMap<String, EdictFn>) -> bool {
        plugin_edicts.contains_key(name) || self.edicts.contains_key(name)
    }

    /// Run one edict and any configured follow-up chain.
    ///
    /// Failures inside an edict are carried in the returned context's
    /// `err` field and stop the chain; `Err` is reserved for resolution
    /// failures and an exceeded chain bound.
    pub fn run(
        &self,
        name: &str,
        ctx: EdictContext,
        plugin_edicts: &HashMap<String, EdictFn>,
    ) -> Result<EdictContext> {
        self.run_at_depth(name, ctx, plugin_edicts, 0)
    }

    fn run_at_depth(
        &self,
        name: &str,
        ctx: EdictContext,
        plugin_edicts: &HashMap<String, EdictFn>,
        depth: usize,
    ) -> Result<EdictContext> {
        if depth >= self.max_chain_depth {
            return Err(LarchError::ChainTooDeep(self.max_chain_depth));
        }
        let edict = plugin_edicts
            .get(name)
            .or_else(|| self.edicts.get(name))
            .cloned()
            .ok_or_else(|| LarchError::UnknownEdict(name.to_string()))?;

        let result = edict(ctx);
        if result.err.is_none() {
            if let Some(next) = self.post_edicts.get(name) {
                let follow = EdictContext {
                    root: result.root.clone(),
                    selected: result.selected.clone(),
                    arguments: result.arguments.clone(),
                    err: None,
                    msg: String::new(),
                    previous: Some(Box::new(result)),
                };
                return self.run_at_depth(next, follow, plugin_edicts, depth + 1);
            }
        }
        Ok(result)
    }
}
