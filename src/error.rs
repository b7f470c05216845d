//! Unified error types for larch
//!
//! Provides a consistent error handling approach across all modules.

/// Unified error type for larch operations
#[derive(Debug, thiserror::Error)]
pub enum LarchError {
    /// I/O errors (stat, read, write, remove, rename)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No edict with the given name, built-in or plugin-provided
    #[error("missing edict \"{0}\"")]
    UnknownEdict(String),

    /// An edict received an argument count its path resolution cannot handle
    #[error("requires {expected}, got {got}")]
    ArityMismatch {
        expected: &'static str,
        got: usize,
    },

    /// A gated host function was called with an argument outside the
    /// plugin's allow-list
    #[error("exec permission not granted for cmd {0}")]
    PermissionDenied(String),

    /// Plugin source failed to compile
    #[error("compile error: {0}")]
    Compile(String),

    /// Plugin module failed to evaluate, or a hook raised at call time
    #[error("eval error: {0}")]
    Eval(String),

    /// A value crossing the scripting boundary did not have the shape the
    /// native side requires
    #[error("decode error: {0}")]
    Decode(String),

    /// A post-edict chain exceeded the configured depth bound
    #[error("edict chain exceeded depth {0}")]
    ChainTooDeep(usize),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(String),

    /// Plugin/system registry errors
    #[error("plugin error: {0}")]
    Plugin(String),
}

/// Convenience Result type using LarchError
pub type Result<T> = std::result::Result<T, LarchError>;

impl LarchError {
    /// Create a Decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a Config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a Plugin error
    pub fn plugin(msg: impl Into<String>) -> Self {
        Self::Plugin(msg.into())
    }

    /// Create an Eval error
    pub fn eval(msg: impl Into<String>) -> Self {
        Self::Eval(msg.into())
    }
}

impl From<mlua::Error> for LarchError {
    fn from(err: mlua::Error) -> Self {
        match err {
            mlua::Error::SyntaxError { message, .. } => LarchError::Compile(message),
            other => LarchError::Eval(other.to_string()),
        }
    }
}

impl From<trash::Error> for LarchError {
    fn from(err: trash::Error) -> Self {
        LarchError::Io(std::io::Error::other(err.to_string()))
    }
}
