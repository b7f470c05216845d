//! Configuration file loading and parsing
//!
//! Loads configuration from `~/.config/larch/config.toml`, writing the
//! defaults there on first run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LarchError, Result};

/// Main configuration file structure
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    /// General settings
    pub general: GeneralConfig,
    /// Edicts triggered by UI actions
    pub actions: ActionsConfig,
    /// Key bindings active in the tree
    pub binds: Vec<Bind>,
    /// Two-keystroke bind groups
    pub modes: HashMap<String, Mode>,
    /// Command-line aliases
    pub shortcuts: Vec<Shortcut>,
    /// Scripting backends
    pub systems: SystemsConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable mouse support
    pub use_mouse: bool,
    /// Bound on post-edict chain length
    pub max_chain_depth: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            use_mouse: true,
            max_chain_depth: 8,
        }
    }
}

/// Edicts run in response to UI actions
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Edict run when a file is clicked
    pub click: String,
    /// Edict run when Enter is pressed on a file
    pub enter: String,
    /// Follow-up edicts: after the key completes, the value runs next
    pub post_edict: HashMap<String, String>,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        let mut post_edict = HashMap::new();
        post_edict.insert("create".to_string(), "edit".to_string());
        Self {
            click: "edit".to_string(),
            enter: "edit".to_string(),
            post_edict,
        }
    }
}

/// One key binding
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Bind {
    /// Character that triggers the edict
    pub rune: Option<char>,
    /// Edict to run
    pub edict: String,
    /// Arguments passed to the edict
    pub arguments: Vec<String>,
}

/// A named group of binds behind a leading keystroke
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Mode {
    /// Character that arms the mode
    pub rune: char,
    /// Binds available while the mode is armed
    pub binds: Vec<Bind>,
}

impl Mode {
    /// Find the bind for a keystroke within this mode
    pub fn get_bind(&self, rune: char) -> Option<&Bind> {
        self.binds.iter().find(|b| b.rune == Some(rune))
    }
}

/// Command-line alias: the keyword expands to an edict plus arguments
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Shortcut {
    pub keyword: String,
    pub edict: String,
    pub arguments: Vec<String>,
}

/// Scripting backend toggles
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemsConfig {
    /// Load the Lua plugin system at startup
    pub lua_plugins: bool,
}

impl Default for SystemsConfig {
    fn default() -> Self {
        Self { lua_plugins: true }
    }
}

impl ConfigFile {
    /// Path of the configuration file
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("larch").join("config.toml"))
    }

    /// Load the configuration, writing the defaults on first run
    pub fn ensure() -> Result<Self> {
        let path = Self::config_path()
            .ok_or_else(|| LarchError::config("no user config directory"))?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        if !path.exists() {
            let defaults = Self::default_config();
            let text = toml::to_string_pretty(&defaults)
                .map_err(|e| LarchError::config(e.to_string()))?;
            fs::write(&path, text)?;
        }
        Self::load_from(&path)
    }

    /// Load a configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| LarchError::config(e.to_string()))
    }

    /// The configuration written on first run
    pub fn default_config() -> Self {
        Self {
            binds: vec![
                Bind {
                    rune: Some('q'),
                    edict: "quit".to_string(),
                    arguments: Vec::new(),
                },
                Bind {
                    rune: Some('e'),
                    edict: "edit".to_string(),
                    arguments: Vec::new(),
                },
                Bind {
                    rune: Some('o'),
                    edict: "open".to_string(),
                    arguments: Vec::new(),
                },
            ],
            shortcuts: vec![
                Shortcut {
                    keyword: "e".to_string(),
                    edict: "edit".to_string(),
                    arguments: Vec::new(),
                },
                Shortcut {
                    keyword: "o".to_string(),
                    edict: "open".to_string(),
                    arguments: Vec::new(),
                },
            ],
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConfigFile::default();
        assert!(config.general.use_mouse);
        assert_eq!(config.general.max_chain_depth, 8);
        assert_eq!(config.actions.enter, "edit");
        assert_eq!(
            config.actions.post_edict.get("create").map(String::as_str),
            Some("edit")
        );
        assert!(config.systems.lua_plugins);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: ConfigFile = toml::from_str(
            r#"
            [general]
            use_mouse = false

            [[binds]]
            rune = "t"
            edict = "trash"

            [modes.git]
            rune = "g"

            [[modes.git.binds]]
            rune = "s"
            edict = "git-status"
            arguments = ["-s"]
            "#,
        )
        .unwrap();

        assert!(!config.general.use_mouse);
        assert_eq!(config.binds.len(), 1);
        assert_eq!(config.binds[0].rune, Some('t'));

        let git = config.modes.get("git").unwrap();
        assert_eq!(git.rune, 'g');
        let bind = git.get_bind('s').unwrap();
        assert_eq!(bind.edict, "git-status");
        assert_eq!(bind.arguments, vec!["-s".to_string()]);
        assert!(git.get_bind('x').is_none());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let defaults = ConfigFile::default_config();
        let text = toml::to_string_pretty(&defaults).unwrap();
        let parsed: ConfigFile = toml::from_str(&text).unwrap();
        assert_eq!(parsed.binds, defaults.binds);
        assert_eq!(parsed.shortcuts.len(), defaults.shortcuts.len());
    }
}
