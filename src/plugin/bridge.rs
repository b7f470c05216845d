//! Value marshaling between native types and the Lua runtime
//!
//! Guest functions are wrapped exactly once, at load time, into native
//! closures. Each wrap allocates a registry key for the Lua function; the
//! key is the native-side handle the owning plugin must release at unload.
//! Guest return values arrive as generic tables and are decoded
//! field-by-field; a missing required field or a field of the wrong type
//! fails that hook invocation rather than defaulting silently.

use std::rc::Rc;

use mlua::{Function, Lua, RegistryKey, Table, Value};

use super::hooks::{FilterFn, LifecycleFn, MangleFn, SortFn};
use crate::app::Bind;
use crate::edict::{EdictContext, EdictFn};
use crate::error::{LarchError, Result};
use crate::tree::{FileReference, NodeMangling};

/// Marshal a file reference into the table shape hooks receive
pub fn file_reference_to_table(lua: &Lua, reference: &FileReference) -> Result<Table> {
    let table = lua.create_table()?;
    table.set("OriginalName", reference.original_name.as_str())?;
    table.set("Name", reference.name.as_str())?;
    table.set("Path", reference.path.to_string_lossy().into_owned())?;
    table.set("IsDirectory", reference.is_dir)?;
    Ok(table)
}

/// Marshal the mangling accumulator for a hook call
pub fn mangling_to_table(lua: &Lua, mangling: &NodeMangling) -> Result<Table> {
    let table = lua.create_table()?;
    table.set("Name", mangling.name.as_str())?;
    table.set("Color", mangling.color.as_str())?;
    table.set("Prefix", mangling.prefix.as_str())?;
    table.set("PrefixColor", mangling.prefix_color.as_str())?;
    table.set("Suffix", mangling.suffix.as_str())?;
    table.set("SuffixColor", mangling.suffix_color.as_str())?;
    Ok(table)
}

/// Assemble a mangling from the six named fields a hook must return
pub fn mangling_from_table(table: &Table) -> Result<NodeMangling> {
    Ok(NodeMangling {
        name: decode_string(table, "Name")?,
        color: decode_string(table, "Color")?,
        prefix: decode_string(table, "Prefix")?,
        prefix_color: decode_string(table, "PrefixColor")?,
        suffix: decode_string(table, "Suffix")?,
        suffix_color: decode_string(table, "SuffixColor")?,
    })
}

/// Marshal an edict context, predecessor chain included
pub fn context_to_table(lua: &Lua, ctx: &EdictContext) -> Result<Table> {
    let table = lua.create_table()?;
    table.set("Root", ctx.root.to_string_lossy().into_owned())?;
    table.set("Selected", ctx.selected.to_string_lossy().into_owned())?;
    let arguments = lua.create_table()?;
    for (i, argument) in ctx.arguments.iter().enumerate() {
        arguments.set(i + 1, argument.as_str())?;
    }
    table.set("Arguments", arguments)?;
    match &ctx.err {
        Some(err) => table.set("Err", err.as_str())?,
        None => table.set("Err", Value::Nil)?,
    }
    table.set("Msg", ctx.msg.as_str())?;
    if let Some(previous) = &ctx.previous {
        table.set("Previous", context_to_table(lua, previous)?)?;
    }
    Ok(table)
}

/// Decode the context table an edict returned.
///
/// Recognized keys update a copy of the invoking context; keys the guest
/// left out keep their prior values.
pub fn context_from_table(table: &Table, base: &EdictContext) -> Result<EdictContext> {
    let mut out = EdictContext {
        root: base.root.clone(),
        selected: base.selected.clone(),
        arguments: base.arguments.clone(),
        err: None,
        msg: String::new(),
        previous: None,
    };
    if let Some(value) = present(table, "Root")? {
        out.root = decode_string_value(value, "Root")?.into();
    }
    if let Some(value) = present(table, "Selected")? {
        out.selected = decode_string_value(value, "Selected")?.into();
    }
    if let Some(value) = present(table, "Arguments")? {
        out.arguments = decode_string_list(value, "Arguments")?;
    }
    if let Some(value) = present(table, "Err")? {
        out.err = Some(decode_string_value(value, "Err")?);
    }
    if let Some(value) = present(table, "Msg")? {
        out.msg = decode_string_value(value, "Msg")?;
    }
    Ok(out)
}

/// Wrap a guest mangle hook into a native closure
pub fn wrap_mangle(lua: &Lua, func: Function) -> Result<(Rc<RegistryKey>, MangleFn)> {
    let key = Rc::new(lua.create_registry_value(func)?);
    let hook_lua = lua.clone();
    let hook_key = Rc::clone(&key);
    let hook: MangleFn = Rc::new(move |reference, mangling| {
        let func: Function = hook_lua.registry_value(&hook_key)?;
        let reference_table = file_reference_to_table(&hook_lua, reference)?;
        let mangling_table = mangling_to_table(&hook_lua, &mangling)?;
        let value: Value = func.call((reference_table, mangling_table))?;
        match value {
            Value::Table(table) => mangling_from_table(&table),
            other => Err(LarchError::decode(format!(
                "mangle hook returned {}, expected table",
                other.type_name()
            ))),
        }
    });
    Ok((key, hook))
}

/// Wrap a guest sort comparator.
///
/// The guest must return a negative, zero, or positive number with
/// three-way-comparator semantics; booleans are not coerced.
pub fn wrap_sort(lua: &Lua, func: Function) -> Result<(Rc<RegistryKey>, SortFn)> {
    let key = Rc::new(lua.create_registry_value(func)?);
    let hook_lua = lua.clone();
    let hook_key = Rc::clone(&key);
    let hook: SortFn = Rc::new(move |a, b| {
        let func: Function = hook_lua.registry_value(&hook_key)?;
        let value: Value = func.call((
            file_reference_to_table(&hook_lua, a)?,
            file_reference_to_table(&hook_lua, b)?,
        ))?;
        decode_ordering(value)
    });
    Ok((key, hook))
}

/// Wrap a guest filter predicate
pub fn wrap_filter(lua: &Lua, func: Function) -> Result<(Rc<RegistryKey>, FilterFn)> {
    let key = Rc::new(lua.create_registry_value(func)?);
    let hook_lua = lua.clone();
    let hook_key = Rc::clone(&key);
    let hook: FilterFn = Rc::new(move |reference| {
        let func: Function = hook_lua.registry_value(&hook_key)?;
        let value: Value = func.call(file_reference_to_table(&hook_lua, reference)?)?;
        match value {
            Value::Boolean(keep) => Ok(keep),
            other => Err(LarchError::decode(format!(
                "filter hook returned {}, expected boolean",
                other.type_name()
            ))),
        }
    });
    Ok((key, hook))
}

/// Wrap a zero-argument lifecycle callback
pub fn wrap_lifecycle(lua: &Lua, func: Function) -> Result<(Rc<RegistryKey>, LifecycleFn)> {
    let key = Rc::new(lua.create_registry_value(func)?);
    let hook_lua = lua.clone();
    let hook_key = Rc::clone(&key);
    let hook: LifecycleFn = Rc::new(move || {
        let func: Function = hook_lua.registry_value(&hook_key)?;
        func.call::<()>(())?;
        Ok(())
    });
    Ok((key, hook))
}

/// Wrap a guest edict.
///
/// A raised error or decode failure lands in the invoking context's `err`;
/// on success the returned context carries the invoking context as its
/// predecessor.
pub fn wrap_edict(lua: &Lua, func: Function) -> Result<(Rc<RegistryKey>, EdictFn)> {
    let key = Rc::new(lua.create_registry_value(func)?);
    let hook_lua = lua.clone();
    let hook_key = Rc::clone(&key);
    let hook: EdictFn = Rc::new(move |ctx: EdictContext| {
        match call_guest_edict(&hook_lua, &hook_key, &ctx) {
            Ok(mut next) => {
                next.previous = Some(Box::new(ctx));
                next
            }
            Err(e) => ctx.fail(e),
        }
    });
    Ok((key, hook))
}

fn call_guest_edict(lua: &Lua, key: &RegistryKey, ctx: &EdictContext) -> Result<EdictContext> {
    let func: Function = lua.registry_value(key)?;
    let value: Value = func.call(context_to_table(lua, ctx)?)?;
    match value {
        Value::Table(table) => context_from_table(&table, ctx),
        other => Err(LarchError::decode(format!(
            "edict returned {}, expected table",
            other.type_name()
        ))),
    }
}

/// Decode a plugin-exported bind list
pub fn binds_from_table(table: &Table) -> Result<Vec<Bind>> {
    let mut binds = Vec::new();
    for entry in table.sequence_values::<Value>() {
        let entry = entry.map_err(LarchError::from)?;
        let Value::Table(entry) = entry else {
            return Err(LarchError::decode("bind entries must be tables"));
        };
        let rune = decode_string(&entry, "rune")?;
        let mut chars = rune.chars();
        let (Some(rune), None) = (chars.next(), chars.next()) else {
            return Err(LarchError::decode("bind rune must be a single character"));
        };
        let edict = decode_string(&entry, "edict")?;
        let arguments = match present(&entry, "arguments")? {
            Some(value) => decode_string_list(value, "arguments")?,
            None => Vec::new(),
        };
        binds.push(Bind {
            rune: Some(rune),
            edict,
            arguments,
        });
    }
    Ok(binds)
}

fn decode_ordering(value: Value) -> Result<std::cmp::Ordering> {
    let number = match value {
        Value::Integer(i) => i as f64,
        Value::Number(n) => n,
        Value::Boolean(_) => {
            return Err(LarchError::decode(
                "sort hook returned boolean, expected negative, zero, or positive number",
            ))
        }
        other => {
            return Err(LarchError::decode(format!(
                "sort hook returned {}, expected number",
                other.type_name()
            )))
        }
    };
    number
        .partial_cmp(&0.0)
        .ok_or_else(|| LarchError::decode("sort hook returned NaN"))
}

fn present(table: &Table, field: &str) -> Result<Option<Value>> {
    match table.get::<Value>(field) {
        Ok(Value::Nil) => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(e.into()),
    }
}

fn decode_string(table: &Table, field: &str) -> Result<String> {
    match table.get::<Value>(field) {
        Ok(Value::Nil) => Err(LarchError::decode(format!("missing field {field}"))),
        Ok(value) => decode_string_value(value, field),
        Err(e) => Err(e.into()),
    }
}

fn decode_string_value(value: Value, field: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.to_string_lossy().to_string()),
        other => Err(LarchError::decode(format!(
            "field {field}: expected string, got {}",
            other.type_name()
        ))),
    }
}

fn decode_string_list(value: Value, field: &str) -> Result<Vec<String>> {
    let Value::Table(table) = value else {
        return Err(LarchError::decode(format!(
            "field {field}: expected table, got {}",
            value.type_name()
        )));
    };
    let mut out = Vec::new();
    for item in table.sequence_values::<Value>() {
        let item = item.map_err(LarchError::from)?;
        out.push(decode_string_value(item, field)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;
    use std::path::PathBuf;

    fn lua_fn(lua: &Lua, code: &str) -> Function {
        lua.load(code).eval().unwrap()
    }

    fn reference(name: &str) -> FileReference {
        FileReference::new(name, format!("/r/{name}"), false)
    }

    #[test]
    fn test_mangle_round_trip() {
        let lua = Lua::new();
        let func = lua_fn(
            &lua,
            r#"
            function(ref, m)
                m.Prefix = "> "
                m.PrefixColor = "green"
                m.Color = "red"
                return m
            end
            "#,
        );
        let (_key, hook) = wrap_mangle(&lua, func).unwrap();

        let mangled = hook(&reference("a.txt"), NodeMangling::seed("a.txt")).unwrap();
        assert_eq!(mangled.name, "a.txt");
        assert_eq!(mangled.prefix, "> ");
        assert_eq!(mangled.prefix_color, "green");
        assert_eq!(mangled.color, "red");
    }

    #[test]
    fn test_mangle_missing_field_is_decode_failure() {
        let lua = Lua::new();
        let func = lua_fn(&lua, "function(ref, m) return { Name = m.Name } end");
        let (_key, hook) = wrap_mangle(&lua, func).unwrap();

        let result = hook(&reference("a.txt"), NodeMangling::seed("a.txt"));
        assert!(matches!(result, Err(LarchError::Decode(_))));
    }

    #[test]
    fn test_mangle_wrong_field_type_is_decode_failure() {
        let lua = Lua::new();
        let func = lua_fn(
            &lua,
            r#"
            function(ref, m)
                m.Color = 7
                return m
            end
            "#,
        );
        let (_key, hook) = wrap_mangle(&lua, func).unwrap();

        let result = hook(&reference("a.txt"), NodeMangling::seed("a.txt"));
        assert!(matches!(result, Err(LarchError::Decode(_))));
    }

    #[test]
    fn test_sort_returns_ordering() {
        let lua = Lua::new();
        let func = lua_fn(
            &lua,
            r#"
            function(a, b)
                if a.Name < b.Name then return -1 end
                if a.Name > b.Name then return 1 end
                return 0
            end
            "#,
        );
        let (_key, hook) = wrap_sort(&lua, func).unwrap();

        assert_eq!(
            hook(&reference("a"), &reference("b")).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            hook(&reference("b"), &reference("a")).unwrap(),
            Ordering::Greater
        );
        assert_eq!(
            hook(&reference("a"), &reference("a")).unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_sort_boolean_is_not_coerced() {
        let lua = Lua::new();
        let func = lua_fn(&lua, "function(a, b) return a.Name < b.Name end");
        let (_key, hook) = wrap_sort(&lua, func).unwrap();

        let result = hook(&reference("a"), &reference("b"));
        assert!(matches!(result, Err(LarchError::Decode(_))));
    }

    #[test]
    fn test_filter_requires_boolean() {
        let lua = Lua::new();
        let func = lua_fn(&lua, "function(ref) return ref.Name ~= 'skip' end");
        let (_key, hook) = wrap_filter(&lua, func).unwrap();
        assert!(hook(&reference("keep")).unwrap());
        assert!(!hook(&reference("skip")).unwrap());

        let func = lua_fn(&lua, "function(ref) return 'yes' end");
        let (_key, hook) = wrap_filter(&lua, func).unwrap();
        assert!(matches!(
            hook(&reference("keep")),
            Err(LarchError::Decode(_))
        ));
    }

    #[test]
    fn test_lifecycle_error_propagates() {
        let lua = Lua::new();
        let func = lua_fn(&lua, "function() error('init failed') end");
        let (_key, hook) = wrap_lifecycle(&lua, func).unwrap();
        assert!(matches!(hook(), Err(LarchError::Eval(_))));
    }

    #[test]
    fn test_edict_updates_context_and_records_previous() {
        let lua = Lua::new();
        let func = lua_fn(
            &lua,
            r#"
            function(ctx)
                ctx.Msg = "did " .. ctx.Arguments[1]
                ctx.Arguments = {}
                return ctx
            end
            "#,
        );
        let (_key, hook) = wrap_edict(&lua, func).unwrap();

        let ctx = EdictContext::new("/r", "/r/a.txt").with_arguments(vec!["things".into()]);
        let result = hook(ctx);
        assert!(result.err.is_none());
        assert_eq!(result.msg, "did things");
        assert!(result.arguments.is_empty());
        assert_eq!(result.selected, PathBuf::from("/r/a.txt"));
        let previous = result.previous.expect("predecessor recorded");
        assert_eq!(previous.arguments, vec!["things".to_string()]);
    }

    #[test]
    fn test_edict_error_lands_in_context() {
        let lua = Lua::new();
        let func = lua_fn(&lua, "function(ctx) error('nope') end");
        let (_key, hook) = wrap_edict(&lua, func).unwrap();

        let result = hook(EdictContext::new("/r", "/r/a.txt"));
        assert!(result.err.is_some());
    }

    #[test]
    fn test_binds_decode() {
        let lua = Lua::new();
        let table: Table = lua
            .load(r#"{ { rune = "g", edict = "git-status", arguments = { "-s" } } }"#)
            .eval()
            .unwrap();
        let binds = binds_from_table(&table).unwrap();
        assert_eq!(binds.len(), 1);
        assert_eq!(binds[0].rune, Some('g'));
        assert_eq!(binds[0].edict, "git-status");
        assert_eq!(binds[0].arguments, vec!["-s".to_string()]);
    }

    #[test]
    fn test_binds_reject_multi_char_rune() {
        let lua = Lua::new();
        let table: Table = lua
            .load(r#"{ { rune = "gg", edict = "x" } }"#)
            .eval()
            .unwrap();
        assert!(matches!(
            binds_from_table(&table),
            Err(LarchError::Decode(_))
        ));
    }
}
