/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::vfs::types::{VfsError, VfsResult};

use super::types::Pid;

/// Script engine errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ScriptError {
    #[error("Script failed to compile: {0}")]
    #[diagnostic(
        code(script::compile),
        help("Check the script source for syntax errors.")
    )]
    Compile(String),

    #[error("Script raised an error: {0}")]
    #[diagnostic(code(script::runtime))]
    Runtime(String),

    #[error("Script value cannot cross the process boundary: {0}")]
    #[diagnostic(
        code(script::conversion),
        help("Only JSON-compatible values (unit, bool, numbers, strings, arrays, maps) can be exchanged.")
    )]
    Conversion(String),

    #[error("Script export not found: {0}")]
    #[diagnostic(code(script::export_not_found))]
    ExportNotFound(String),

    #[error("Script terminated")]
    #[diagnostic(code(script::terminated))]
    Terminated,
}

/// Script engine result
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Process runtime errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ProcessError {
    #[error("Process {0} not found")]
    #[diagnostic(
        code(process::not_found),
        help("The process may have terminated or never existed. Check PID validity.")
    )]
    NotFound(Pid),

    #[error("Failed to spawn process: {0}")]
    #[diagnostic(
        code(process::spawn_failed),
        help("Check that the executable exists and is valid UTF-8 script source.")
    )]
    SpawnFailed(String),

    #[error("Bad file descriptor: {0}")]
    #[diagnostic(code(process::bad_fd))]
    BadDescriptor(u32),

    #[error("Malformed syscall: {0}")]
    #[diagnostic(
        code(process::malformed_syscall),
        help("Requests are arrays of the form [correlationId, opName, ...args].")
    )]
    MalformedSyscall(String),

    #[error("Process channel closed")]
    #[diagnostic(code(process::channel_closed))]
    ChannelClosed,
}

/// Process runtime result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Umbrella error for operations spanning several subsystems
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum KernelError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Vfs(#[from] VfsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),
}

impl KernelError {
    /// True when the error is a missing file or path segment
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, KernelError::Vfs(VfsError::NotFound(_)))
    }
}

/// Common result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;
