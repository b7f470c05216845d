//! Lua scripting system
//!
//! Discovers plugin script units in the per-system directory, loads each
//! one as an isolated module, and binds the exports the lifecycle contract
//! recognizes. One plugin failing to compile or evaluate never affects its
//! siblings. Every Lua function bound into a hook slot is recorded as a
//! registry-key handle owned by the plugin and released at unload; the
//! runtime is never torn down while handles are live.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::{Function, Lua, RegistryKey, Value};
use tracing::{debug, warn};

use super::api::{CommandQueue, UiCommand};
use super::bridge;
use super::hooks::{PluginHooks, PluginState};
use super::registry::{system_dir, System};
use super::sandbox::{self, PermissionSet};
use crate::error::{LarchError, Result};

/// Entry-point filename for directory-shaped plugins
pub const ENTRY_POINT: &str = "init.lua";

/// One plugin unit and everything it owns across the boundary
pub struct LuaPlugin {
    name: String,
    path: PathBuf,
    state: PluginState,
    handles: Vec<Rc<RegistryKey>>,
    permissions: Rc<PermissionSet>,
    hooks: PluginHooks,
}

impl LuaPlugin {
    fn discovered(name: String, path: PathBuf) -> Self {
        Self {
            name,
            path,
            state: PluginState::Discovered,
            handles: Vec::new(),
            permissions: Rc::new(PermissionSet::default()),
            hooks: PluginHooks::default(),
        }
    }

    /// Display name (filename minus extension, or directory name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current load state
    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Declared permissions, as applied by the sandbox
    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    fn load(&mut self, lua: &Lua, commands: &CommandQueue) -> Result<()> {
        let source = fs::read_to_string(&self.path)?;

        // Isolated module environment; globals stay reachable through the
        // metatable but plugin-level assignments never leak out of it.
        let env = lua.create_table()?;
        let meta = lua.create_table()?;
        meta.set("__index", lua.globals())?;
        env.set_metatable(Some(meta));

        let func = lua
            .load(&source)
            .set_name(self.path.to_string_lossy())
            .set_environment(env)
            .into_function()?;
        self.state = PluginState::Compiled;

        let value: Value = func.call(())?;
        let Value::Table(exports) = value else {
            return Err(LarchError::eval(format!(
                "{}: module did not return a table",
                self.name
            )));
        };
        self.state = PluginState::Evaluated;

        // The permission export is applied before any other export is
        // bound, so the gated function can never be installed ungated no
        // matter where the declaration appears in the script.
        self.permissions = Rc::new(match exports.get::<Value>("permissions")? {
            Value::Nil => PermissionSet::default(),
            Value::Table(table) => PermissionSet::from_export(&table)?,
            other => {
                return Err(LarchError::plugin(format!(
                    "{}: permissions must be a table, got {}",
                    self.name,
                    other.type_name()
                )));
            }
        });

        for pair in exports.clone().pairs::<Value, Value>() {
            let (key, value) = pair.map_err(LarchError::from)?;
            let Value::String(key) = key else { continue };
            let key = key.to_string_lossy().to_string();
            match key.as_str() {
                "permissions" => {}
                "edicts" => self.bind_edicts(lua, value)?,
                "exec" => {
                    let gate = sandbox::gated_exec(lua, Rc::clone(&self.permissions))?;
                    exports.set("exec", gate)?;
                }
                "popup" => {
                    let queue = commands.clone();
                    let host = lua.create_function(move |_, text: String| {
                        queue.push(UiCommand::Popup(text));
                        Ok(())
                    })?;
                    exports.set("popup", host)?;
                }
                "refreshTree" => {
                    exports.set("refreshTree", ui_call(lua, commands, UiCommand::RefreshTree)?)?;
                }
                "focusTree" => {
                    exports.set("focusTree", ui_call(lua, commands, UiCommand::FocusTree)?)?;
                }
                "focusLocation" => {
                    exports
                        .set("focusLocation", ui_call(lua, commands, UiCommand::FocusLocation)?)?;
                }
                "focusInput" => {
                    exports.set("focusInput", ui_call(lua, commands, UiCommand::FocusInput)?)?;
                }
                "mangleTreeNode" => {
                    let (handle, hook) =
                        bridge::wrap_mangle(lua, expect_function(value, "mangleTreeNode")?)?;
                    self.handles.push(handle);
                    self.hooks.mangle = Some(hook);
                }
                "sortTreeNode" => {
                    let (handle, hook) =
                        bridge::wrap_sort(lua, expect_function(value, "sortTreeNode")?)?;
                    self.handles.push(handle);
                    self.hooks.sort = Some(hook);
                }
                "filterTreeNode" => {
                    let (handle, hook) =
                        bridge::wrap_filter(lua, expect_function(value, "filterTreeNode")?)?;
                    self.handles.push(handle);
                    self.hooks.filter = Some(hook);
                }
                "onInit" => {
                    let (handle, hook) =
                        bridge::wrap_lifecycle(lua, expect_function(value, "onInit")?)?;
                    self.handles.push(handle);
                    self.hooks.on_init = Some(hook);
                }
                "onTreeRefresh" => {
                    let (handle, hook) =
                        bridge::wrap_lifecycle(lua, expect_function(value, "onTreeRefresh")?)?;
                    self.handles.push(handle);
                    self.hooks.on_tree_refresh = Some(hook);
                }
                "binds" => {
                    let Value::Table(table) = value else {
                        return Err(LarchError::plugin(format!(
                            "{}: binds must be a table",
                            self.name
                        )));
                    };
                    self.hooks.binds = bridge::binds_from_table(&table)?;
                }
                other => {
                    debug!(plugin = %self.name, export = other, "ignoring unrecognized export");
                }
            }
        }

        self.state = PluginState::Active;
        Ok(())
    }

    fn bind_edicts(&mut self, lua: &Lua, value: Value) -> Result<()> {
        let Value::Table(edicts) = value else {
            return Err(LarchError::plugin(format!(
                "{}: edicts must be a table",
                self.name
            )));
        };
        for pair in edicts.pairs::<Value, Value>() {
            let (name, func) = pair.map_err(LarchError::from)?;
            let Value::String(name) = name else {
                return Err(LarchError::plugin(format!(
                    "{}: edict names must be strings",
                    self.name
                )));
            };
            let func = expect_function(func, "edict")?;
            let (handle, hook) = bridge::wrap_edict(lua, func)?;
            self.handles.push(handle);
            self.hooks
                .edicts
                .push((name.to_string_lossy().to_string(), hook));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.hooks = PluginHooks::default();
        self.handles.clear();
    }
}

fn expect_function(value: Value, what: &str) -> Result<Function> {
    match value {
        Value::Function(func) => Ok(func),
        other => Err(LarchError::plugin(format!(
            "{what} must be a function, got {}",
            other.type_name()
        ))),
    }
}

fn ui_call(lua: &Lua, commands: &CommandQueue, command: UiCommand) -> Result<Function> {
    let queue = commands.clone();
    let func = lua.create_function(move |_, ()| {
        queue.push(command.clone());
        Ok(())
    })?;
    Ok(func)
}

/// The Lua scripting backend
#[derive(Default)]
pub struct LuaSystem {
    lua: Option<Lua>,
    commands: Option<CommandQueue>,
    plugin_dir: Option<PathBuf>,
    plugins: Vec<LuaPlugin>,
}

impl LuaSystem {
    /// Create a system using the standard per-system plugin directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a system loading from an explicit directory
    pub fn with_plugin_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// The discovered plugins with their states
    pub fn plugins(&self) -> &[LuaPlugin] {
        &self.plugins
    }

    /// Release every plugin's native handles and clear the plugin list
    pub fn unload_plugins(&mut self) {
        for plugin in &mut self.plugins {
            plugin.release();
        }
        self.plugins.clear();
        if let Some(lua) = &self.lua {
            // Dropped registry keys are reclaimed here, not left to the
            // runtime's collector.
            lua.expire_registry_values();
        }
    }

    fn runtime(&self) -> Result<&Lua> {
        self.lua
            .as_ref()
            .ok_or_else(|| LarchError::plugin("lua system is not initialized"))
    }

    fn dir(&self) -> Result<PathBuf> {
        match &self.plugin_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Ok(dir.clone())
            }
            None => system_dir(self.name()),
        }
    }
}

impl System for LuaSystem {
    fn name(&self) -> &str {
        "lua"
    }

    fn init(&mut self, commands: CommandQueue) -> Result<()> {
        self.lua = Some(Lua::new());
        self.commands = Some(commands);
        Ok(())
    }

    fn deinit(&mut self) -> Result<()> {
        self.unload_plugins();
        self.lua = None;
        self.commands = None;
        Ok(())
    }

    fn populate_plugins(&mut self) -> Result<()> {
        let dir = self.dir()?;
        let mut entries: Vec<_> = fs::read_dir(&dir)?.collect::<std::io::Result<Vec<_>>>()?;
        // Directory order is not stable; name order is the declaration
        // order plugin authors can rely on.
        entries.sort_by_key(|entry| entry.file_name());

        let mut discovered = Vec::new();
        for entry in entries {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                let entry_point = dir.join(&file_name).join(ENTRY_POINT);
                if !entry_point.is_file() {
                    return Err(LarchError::plugin(format!(
                        "{file_name}: missing {ENTRY_POINT}"
                    )));
                }
                discovered.push(LuaPlugin::discovered(file_name, entry_point));
            } else if let Some(stem) = file_name.strip_suffix(".lua") {
                discovered.push(LuaPlugin::discovered(
                    stem.to_string(),
                    dir.join(&file_name),
                ));
            }
        }
        self.plugins = discovered;
        Ok(())
    }

    fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name.clone()).collect()
    }

    fn load_plugin(&mut self, name: &str) -> Result<()> {
        let lua = self.runtime()?.clone();
        let commands = self
            .commands
            .clone()
            .ok_or_else(|| LarchError::plugin("lua system is not initialized"))?;
        let plugin = self
            .plugins
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| LarchError::plugin(format!("no such plugin {name}")))?;

        match plugin.load(&lua, &commands) {
            Ok(()) => {
                if let Some(on_init) = &plugin.hooks.on_init {
                    // Post-load hooks degrade instead of reverting the
                    // plugin: it stays active with a logged warning.
                    if let Err(e) = on_init() {
                        warn!(plugin = %plugin.name, error = %e, "onInit failed");
                    }
                }
                Ok(())
            }
            Err(e) => {
                plugin.release();
                plugin.state = PluginState::Failed;
                Err(e)
            }
        }
    }

    fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.plugins
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.state)
    }

    fn active_hooks(&self) -> Vec<&PluginHooks> {
        self.plugins
            .iter()
            .filter(|p| p.state == PluginState::Active)
            .map(|p| &p.hooks)
            .collect()
    }
}

/// Load every discovered plugin of one system, isolating failures and
/// narrating progress through `status`.
pub fn load_all(system: &mut dyn System, status: &mut dyn FnMut(String)) {
    for name in system.plugin_names() {
        match system.load_plugin(&name) {
            Ok(()) => status(format!("  {name}... ok")),
            Err(e) => status(format!("  {name}... {e}")),
        }
    }
}
