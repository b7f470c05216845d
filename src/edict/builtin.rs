//! Built-in edicts
//!
//! Each edict takes the invocation context and returns it with either
//! `msg` or `err` recorded. Path arguments resolve through the context's
//! rooting rules.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::EdictContext;
use crate::error::LarchError;

/// Launch the external editor on the target, detached and non-blocking
pub fn edit(ctx: EdictContext) -> EdictContext {
    let path = match ctx.target_abs_path() {
        Ok(p) => p,
        Err(e) => return ctx.fail(e),
    };
    let editor = match env::var("EDITOR") {
        Ok(e) if !e.is_empty() => e,
        _ => return ctx.fail("EDITOR is not set"),
    };
    match spawn_detached(&editor, [&path]) {
        Ok(()) => {
            let msg = path.display().to_string();
            ctx.ok(msg)
        }
        Err(e) => ctx.fail(e),
    }
}

/// Hand the target to the platform file opener
pub fn open(ctx: EdictContext) -> EdictContext {
    let path = match ctx.target_abs_path() {
        Ok(p) => p,
        Err(e) => return ctx.fail(e),
    };
    match open_target(&path) {
        Ok(()) => {
            let msg = path.display().to_string();
            ctx.ok(msg)
        }
        Err(e) => ctx.fail(e),
    }
}

/// Create an empty file, parent directories included.
///
/// Fails if the path already exists in any form. On success the context's
/// selection is rewritten to the new file and the arguments are cleared,
/// so a chained edict operates on what was just created rather than the
/// original selection.
pub fn create(ctx: EdictContext) -> EdictContext {
    let path = match ctx.target_abs_path() {
        Ok(p) => p,
        Err(e) => return ctx.fail(e),
    };
    if fs::symlink_metadata(&path).is_ok() {
        return ctx.fail(format!("{} already exists", path.display()));
    }
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            return ctx.fail(e);
        }
    }
    if let Err(e) = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        return ctx.fail(e);
    }
    let msg = path.display().to_string();
    let mut ctx = ctx.ok(msg);
    ctx.selected = path;
    ctx.arguments.clear();
    ctx
}

/// Create a directory. A non-rooted argument resolves against the selected
/// path itself when that is a directory.
pub fn mkdir(ctx: EdictContext) -> EdictContext {
    if ctx.arguments.len() != 1 {
        let got = ctx.arguments.len();
        return ctx.fail(LarchError::ArityMismatch {
            expected: "1 argument",
            got,
        });
    }
    let arg = ctx.arguments[0].clone();
    let path = match ctx.dir_abs_path_from_rel(&arg) {
        Ok(p) => p,
        Err(e) => return ctx.fail(e),
    };
    match fs::create_dir_all(&path) {
        Ok(()) => {
            let msg = path.display().to_string();
            ctx.ok(msg)
        }
        Err(e) => ctx.fail(e),
    }
}

/// Delete the target permanently.
///
/// The target path is reported in `msg` whether or not the delete
/// succeeds; only `err` distinguishes the outcome.
pub fn remove(ctx: EdictContext) -> EdictContext {
    let path = match ctx.target_abs_path() {
        Ok(p) => p,
        Err(e) => return ctx.fail(e),
    };
    let msg = path.display().to_string();
    let result = match fs::symlink_metadata(&path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
        Ok(_) => fs::remove_file(&path),
        Err(e) => Err(e),
    };
    let mut ctx = match result {
        Ok(()) => ctx,
        Err(e) => ctx.fail(e),
    };
    ctx.msg = msg;
    ctx
}

/// Rename the from-path to the to-path at the OS level
pub fn rename(ctx: EdictContext) -> EdictContext {
    let (from, to) = match ctx.from_to_abs_path() {
        Ok(pair) => pair,
        Err(e) => return ctx.fail(e),
    };
    match fs::rename(&from, &to) {
        Ok(()) => {
            let msg = format!("{}->{}", from.display(), to.display());
            ctx.ok(msg)
        }
        Err(e) => ctx.fail(e),
    }
}

/// Move the target to the recoverable trash store instead of deleting it
pub fn trash(ctx: EdictContext) -> EdictContext {
    let path = match ctx.target_abs_path() {
        Ok(p) => p,
        Err(e) => return ctx.fail(e),
    };
    match trash::delete(&path) {
        Ok(()) => {
            let msg = path.display().to_string();
            ctx.ok(msg)
        }
        Err(e) => ctx.fail(e),
    }
}

/// Start a process with no controlling stdio, not waited on
fn spawn_detached<I, S>(program: &str, args: I) -> std::io::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command.spawn().map(|_| ())
}

#[cfg(unix)]
fn open_target(path: &std::path::Path) -> std::io::Result<()> {
    // Prefer xdg-open; fall back to open where it is unavailable.
    let program = if find_in_path("xdg-open").is_some() {
        "xdg-open"
    } else {
        "open"
    };
    spawn_detached(program, [path])
}

#[cfg(windows)]
fn open_target(path: &std::path::Path) -> std::io::Result<()> {
    spawn_detached(
        "rundll32.exe",
        [OsStr::new("url.dll,FileProtocolHandler"), path.as_os_str()],
    )
}

#[cfg(unix)]
fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx_in(temp: &TempDir, selected: &str) -> EdictContext {
        EdictContext::new(temp.path(), temp.path().join(selected))
    }

    #[test]
    fn test_create_makes_file_and_rewrites_selection() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("existing.txt"), b"x").unwrap();

        let ctx = ctx_in(&temp, "existing.txt").with_arguments(vec!["sub/new.txt".into()]);
        let result = create(ctx);

        assert!(result.err.is_none(), "{:?}", result.err);
        let created = temp.path().join("sub/new.txt");
        assert!(created.is_file());
        assert_eq!(result.selected, created);
        assert!(result.arguments.is_empty());
    }

    #[test]
    fn test_create_fails_on_existing_path() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), b"x").unwrap();

        let ctx = ctx_in(&temp, "a.txt");
        let result = create(ctx);
        assert!(result.err.is_some());
    }

    #[test]
    fn test_mkdir_inside_selected_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("parent")).unwrap();

        let ctx = ctx_in(&temp, "parent").with_arguments(vec!["child".into()]);
        let result = mkdir(ctx);

        assert!(result.err.is_none(), "{:?}", result.err);
        assert!(temp.path().join("parent/child").is_dir());
    }

    #[test]
    fn test_mkdir_beside_selected_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), b"x").unwrap();

        let ctx = ctx_in(&temp, "a.txt").with_arguments(vec!["d".into()]);
        let result = mkdir(ctx);

        assert!(result.err.is_none(), "{:?}", result.err);
        assert!(temp.path().join("d").is_dir());
    }

    #[test]
    fn test_mkdir_requires_one_argument() {
        let temp = TempDir::new().unwrap();
        let result = mkdir(ctx_in(&temp, "a"));
        assert!(result.err.is_some());
    }

    #[test]
    fn test_remove_reports_path_on_success_and_failure() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), b"x").unwrap();

        let result = remove(ctx_in(&temp, "a.txt"));
        assert!(result.err.is_none());
        assert!(result.msg.ends_with("a.txt"));
        assert!(!temp.path().join("a.txt").exists());

        // Deleting it again fails but still reports the target path.
        let result = remove(ctx_in(&temp, "a.txt"));
        assert!(result.err.is_some());
        assert!(result.msg.ends_with("a.txt"));
    }

    #[test]
    fn test_remove_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("d/nested")).unwrap();

        let result = remove(ctx_in(&temp, "d"));
        assert!(result.err.is_none());
        assert!(!temp.path().join("d").exists());
    }

    #[test]
    fn test_rename_message_format() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), b"x").unwrap();

        let ctx = ctx_in(&temp, "a.txt").with_arguments(vec!["b.txt".into()]);
        let result = rename(ctx);

        assert!(result.err.is_none(), "{:?}", result.err);
        assert!(temp.path().join("b.txt").is_file());
        let from = temp.path().join("a.txt");
        let to = temp.path().join("b.txt");
        assert_eq!(
            result.msg,
            format!("{}->{}", from.display(), to.display())
        );
    }

    #[test]
    fn test_edit_without_editor_fails() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), b"x").unwrap();

        // EDITOR is cleared for this process only.
        let saved = env::var_os("EDITOR");
        env::remove_var("EDITOR");
        let result = edit(ctx_in(&temp, "a.txt"));
        if let Some(v) = saved {
            env::set_var("EDITOR", v);
        }
        assert!(result.err.is_some());
    }
}
