//! Error types for the script bridge.

use std::path::PathBuf;

use thiserror::Error;

use crate::abi::M64pError;

/// Misuse of the script environment lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("script environment is already initialized")]
    AlreadyInitialized,

    #[error("script environment is not initialized")]
    NotInitialized,

    /// `luaL_newstate` returned null.
    #[error("failed to create a Lua state")]
    CreateFailed,
}

impl EnvError {
    /// Status code reported to the host.
    pub fn code(&self) -> M64pError {
        match self {
            Self::AlreadyInitialized => M64pError::ALREADY_INIT,
            Self::NotInitialized => M64pError::NOT_INIT,
            Self::CreateFailed => M64pError::NO_MEMORY,
        }
    }
}

/// Failure to turn a script file into an entry table.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError {
    #[error(transparent)]
    Environment(#[from] EnvError),

    #[error("script not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file could not be read or compiled.
    #[error("failed to load script: {0}")]
    Load(String),

    /// The chunk raised an error while running.
    #[error("script execution failed: {0}")]
    Execution(String),

    /// The chunk ran but did not return a table.
    #[error("script returned a {0} value instead of a table of entry points")]
    NotATable(String),
}

/// Failure of a single entry point invocation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    #[error("no script session is active")]
    NoActiveSession,

    #[error("invalid call arguments: {0}")]
    Argument(String),

    /// The script raised an error; carries the traceback text.
    #[error("lua runtime error: {0}")]
    Runtime(String),
}

/// A raw command buffer shorter than its own header claims.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command buffer is missing its two length bytes")]
    MissingHeader,

    #[error("command frame needs {declared} bytes but the buffer holds {available}")]
    Truncated { declared: usize, available: usize },
}
