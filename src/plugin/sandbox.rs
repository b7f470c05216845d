//! Capability sandbox
//!
//! Each plugin declares the executables it may run; the declaration is
//! inert until the lifecycle manager applies it at load time. The gated
//! host function checks the allow-list on every call, before any process
//! is spawned. No declaration means an empty allow-list: the gated
//! function denies everything, but the plugin itself still loads.

use std::process::Command;
use std::rc::Rc;

use mlua::{Function, Lua, Value, Variadic};

use crate::error::{LarchError, Result};

/// Per-plugin permission set
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PermissionSet {
    exec: Vec<String>,
}

impl PermissionSet {
    /// Parse a plugin's `permissions` export.
    ///
    /// `exec` is the only recognized permission; any other key is a hard
    /// load error rather than something to ignore.
    pub fn from_export(table: &mlua::Table) -> Result<Self> {
        let mut set = PermissionSet::default();
        for pair in table.pairs::<Value, Value>() {
            let (key, value) = pair.map_err(LarchError::from)?;
            let Value::String(key) = key else {
                return Err(LarchError::plugin("permission names must be strings"));
            };
            let key = key.to_string_lossy().to_string();
            match key.as_str() {
                "exec" => set.exec = decode_executables(value)?,
                other => {
                    return Err(LarchError::plugin(format!("unknown permission {other}")));
                }
            }
        }
        Ok(set)
    }

    /// Whether the named executable is on the allow-list
    pub fn allows_exec(&self, executable: &str) -> bool {
        self.exec.iter().any(|allowed| allowed == executable)
    }

    /// The declared executables
    pub fn exec_list(&self) -> &[String] {
        &self.exec
    }
}

fn decode_executables(value: Value) -> Result<Vec<String>> {
    let Value::Table(list) = value else {
        return Err(LarchError::plugin(format!(
            "permission exec: expected table, got {}",
            value.type_name()
        )));
    };
    let mut out = Vec::new();
    for item in list.sequence_values::<Value>() {
        match item.map_err(LarchError::from)? {
            Value::String(s) => out.push(s.to_string_lossy().to_string()),
            other => {
                return Err(LarchError::plugin(format!(
                    "permission exec: expected string, got {}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(out)
}

/// Build the gated subprocess-run host function for one plugin.
///
/// A call whose executable is absent from the allow-list fails with a
/// permission error and spawns nothing; an allowed call runs the process
/// and returns its captured stdout.
pub fn gated_exec(lua: &Lua, permissions: Rc<PermissionSet>) -> Result<Function> {
    let func = lua.create_function(move |_, (cmd, args): (String, Variadic<String>)| {
        if !permissions.allows_exec(&cmd) {
            return Err(mlua::Error::external(LarchError::PermissionDenied(cmd)));
        }
        let output = Command::new(&cmd)
            .args(args.iter())
            .output()
            .map_err(mlua::Error::external)?;
        if !output.status.success() {
            return Err(mlua::Error::external(LarchError::eval(format!(
                "{} exited with {}: {}",
                cmd,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    })?;
    Ok(func)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permissions(lua: &Lua, code: &str) -> Result<PermissionSet> {
        let table: mlua::Table = lua.load(code).eval().unwrap();
        PermissionSet::from_export(&table)
    }

    #[test]
    fn test_parse_exec_permissions() {
        let lua = Lua::new();
        let set = permissions(&lua, r#"{ exec = { "git", "echo" } }"#).unwrap();
        assert_eq!(set.exec_list(), ["git", "echo"]);
        assert!(set.allows_exec("git"));
        assert!(!set.allows_exec("rm"));
    }

    #[test]
    fn test_unknown_permission_is_hard_error() {
        let lua = Lua::new();
        let result = permissions(&lua, r#"{ network = { "example.com" } }"#);
        assert!(matches!(result, Err(LarchError::Plugin(_))));
    }

    #[test]
    fn test_missing_declaration_denies_all() {
        let set = PermissionSet::default();
        assert!(!set.allows_exec("echo"));
    }

    #[test]
    fn test_denied_exec_spawns_nothing() {
        let lua = Lua::new();
        let set = Rc::new(PermissionSet::default());
        let exec = gated_exec(&lua, set).unwrap();
        lua.globals().set("exec", exec).unwrap();

        // The denial must come from the permission check, not from a
        // failed spawn of the nonexistent binary.
        let err = lua
            .load(r#"exec("larch-test-does-not-exist")"#)
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("exec permission not granted"));
    }

    #[test]
    fn test_allowed_exec_captures_output() {
        let lua = Lua::new();
        let set = permissions(&lua, r#"{ exec = { "echo" } }"#).unwrap();
        let exec = gated_exec(&lua, Rc::new(set)).unwrap();
        lua.globals().set("exec", exec).unwrap();

        let out: String = lua.load(r#"return exec("echo", "hi")"#).eval().unwrap();
        assert_eq!(out, "hi\n");
    }
}
