//! System registry and hook aggregation
//!
//! A system is a named scripting backend owning zero or more plugins. The
//! registry collects systems in registration order and aggregates their
//! plugins' hooks into an immutable snapshot. Snapshots are rebuilt
//! wholesale after a load batch, never mutated in place, and are passed
//! explicitly to the tree sync engine and the edict pipeline.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::warn;

use super::api::CommandQueue;
use super::hooks::{FilterFn, LifecycleFn, MangleFn, PluginHooks, PluginState, SortFn};
use crate::app::Bind;
use crate::edict::EdictFn;
use crate::error::{LarchError, Result};

/// A scripting backend hosting plugins
pub trait System {
    /// Short name, also the plugin subdirectory name
    fn name(&self) -> &str;
    /// Bring up the runtime
    fn init(&mut self, commands: CommandQueue) -> Result<()>;
    /// Tear down, unloading all plugins first
    fn deinit(&mut self) -> Result<()>;
    /// Discover plugin units on disk
    fn populate_plugins(&mut self) -> Result<()>;
    /// Names of discovered plugins
    fn plugin_names(&self) -> Vec<String>;
    /// Load one discovered plugin; failures affect only that plugin
    fn load_plugin(&mut self, name: &str) -> Result<()>;
    /// Load state of a discovered plugin
    fn plugin_state(&self, name: &str) -> Option<PluginState>;
    /// Hook bundles of the plugins that loaded successfully, in
    /// declaration order
    fn active_hooks(&self) -> Vec<&PluginHooks>;
}

/// Aggregated hooks from every active plugin across every system.
///
/// Hook lists preserve system-then-plugin declaration order, which is the
/// tie-break order when several hooks apply to the same node. Duplicate
/// edict names resolve to the last writer.
#[derive(Default, Clone)]
pub struct HookSnapshot {
    pub mangle: Vec<MangleFn>,
    pub sort: Vec<SortFn>,
    pub filter: Vec<FilterFn>,
    pub tree_refresh: Vec<LifecycleFn>,
    pub edicts: HashMap<String, EdictFn>,
    pub binds: Vec<Bind>,
}

/// Ordered collection of scripting systems
#[derive(Default)]
pub struct SystemRegistry {
    systems: Vec<Box<dyn System>>,
}

impl SystemRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a system; names must be unique
    pub fn register(&mut self, system: Box<dyn System>) -> Result<()> {
        if self.systems.iter().any(|s| s.name() == system.name()) {
            return Err(LarchError::plugin(format!(
                "system {} already registered",
                system.name()
            )));
        }
        self.systems.push(system);
        Ok(())
    }

    /// Iterate systems mutably, in registration order
    pub fn systems_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn System>> {
        self.systems.iter_mut()
    }

    /// Deinitialize every system, unloading plugins
    pub fn deinit_all(&mut self) {
        for system in &mut self.systems {
            if let Err(e) = system.deinit() {
                warn!(system = system.name(), error = %e, "deinit failed");
            }
        }
    }

    /// Rebuild the aggregated hook snapshot from scratch
    pub fn snapshot(&self) -> HookSnapshot {
        let mut snapshot = HookSnapshot::default();
        for system in &self.systems {
            for hooks in system.active_hooks() {
                if let Some(hook) = &hooks.mangle {
                    snapshot.mangle.push(hook.clone());
                }
                if let Some(hook) = &hooks.sort {
                    snapshot.sort.push(hook.clone());
                }
                if let Some(hook) = &hooks.filter {
                    snapshot.filter.push(hook.clone());
                }
                if let Some(hook) = &hooks.on_tree_refresh {
                    snapshot.tree_refresh.push(hook.clone());
                }
                for (name, edict) in &hooks.edicts {
                    snapshot.edicts.insert(name.clone(), edict.clone());
                }
                snapshot.binds.extend(hooks.binds.iter().cloned());
            }
        }
        snapshot
    }
}

/// Per-system plugin directory, created on demand
pub fn system_dir(name: &str) -> Result<PathBuf> {
    let config = dirs::config_dir()
        .ok_or_else(|| LarchError::config("no user config directory"))?;
    let dir = config.join("larch").join("plugins").join(name);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
