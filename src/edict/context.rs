//! Edict invocation context and its path resolution rules

use std::path::{Path, PathBuf};

use crate::error::{LarchError, Result};

/// Carries command input and output through a single edict invocation.
///
/// `previous` points at the context of the preceding edict in a chain. Each
/// context owns a copy of its predecessor; the chain is a backward-only
/// audit trail and is never traversed for control flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdictContext {
    /// Root directory of the tree
    pub root: PathBuf,
    /// Path the user had selected when the edict was invoked
    pub selected: PathBuf,
    /// Free-form argument tokens
    pub arguments: Vec<String>,
    /// Failure description, if the edict failed
    pub err: Option<String>,
    /// Result message, if the edict succeeded (or, for removal, the target
    /// path regardless of outcome)
    pub msg: String,
    /// Context of the preceding edict in a chain
    pub previous: Option<Box<EdictContext>>,
}

impl EdictContext {
    /// Create a context for a fresh top-level invocation
    pub fn new(root: impl Into<PathBuf>, selected: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            selected: selected.into(),
            ..Self::default()
        }
    }

    /// Builder-style arguments
    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Record success
    pub fn ok(mut self, msg: impl Into<String>) -> Self {
        self.err = None;
        self.msg = msg.into();
        self
    }

    /// Record failure
    pub fn fail(mut self, err: impl std::fmt::Display) -> Self {
        self.err = Some(err.to_string());
        self
    }

    /// Resolve the single target of this invocation.
    ///
    /// Zero arguments target the selected path; one argument resolves
    /// through [`EdictContext::abs_path_from_rel`]; anything else is an
    /// arity error.
    pub fn target_abs_path(&self) -> Result<PathBuf> {
        match self.arguments.len() {
            0 => Ok(std::path::absolute(&self.selected)?),
            1 => self.abs_path_from_rel(&self.arguments[0]),
            n => Err(LarchError::ArityMismatch {
                expected: "0 or 1 arguments",
                got: n,
            }),
        }
    }

    /// Resolve a relative token to an absolute path.
    ///
    /// A leading `/` roots the token at `root` ("/some/location" means
    /// "<root>/some/location"); otherwise it is joined against the
    /// directory containing the selected path.
    pub fn abs_path_from_rel(&self, path: &str) -> Result<PathBuf> {
        let joined = match path.strip_prefix('/') {
            Some(rooted) => self.root.join(rooted),
            None => self.selected_dir().join(path),
        };
        Ok(std::path::absolute(joined)?)
    }

    /// Like [`EdictContext::abs_path_from_rel`], but non-rooted tokens
    /// resolve against the selected path itself when it is a directory.
    /// Used by `mkdir`, where "make a directory here" means inside the
    /// selected directory.
    pub fn dir_abs_path_from_rel(&self, path: &str) -> Result<PathBuf> {
        let joined = match path.strip_prefix('/') {
            Some(rooted) => self.root.join(rooted),
            None if self.selected.is_dir() => self.selected.join(path),
            None => self.selected_dir().join(path),
        };
        Ok(std::path::absolute(joined)?)
    }

    /// Express an absolute path relative to `root`
    pub fn rel_path_from_abs(&self, path: &Path) -> Result<PathBuf> {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| {
                LarchError::config(format!(
                    "{} is outside root {}",
                    path.display(),
                    self.root.display()
                ))
            })
    }

    /// Resolve a from/to pair for edicts that move an entry.
    ///
    /// One argument renames the selected path to the resolved token; two
    /// arguments resolve each independently through the rooting rule.
    pub fn from_to_abs_path(&self) -> Result<(PathBuf, PathBuf)> {
        match self.arguments.len() {
            0 => Err(LarchError::ArityMismatch {
                expected: "a path",
                got: 0,
            }),
            1 => {
                let from = std::path::absolute(&self.selected)?;
                let to = self.abs_path_from_rel(&self.arguments[0])?;
                Ok((from, to))
            }
            2 => {
                let from = self.abs_path_from_rel(&self.arguments[0])?;
                let to = self.abs_path_from_rel(&self.arguments[1])?;
                Ok((from, to))
            }
            n => Err(LarchError::ArityMismatch {
                expected: "1 or 2 arguments only",
                got: n,
            }),
        }
    }

    fn selected_dir(&self) -> &Path {
        self.selected.parent().unwrap_or(Path::new("."))
    }
}
