/*!
 * Kernel Configuration
 *
 * Runtime settings read from the environment at boot.
 */

use std::path::PathBuf;

use super::limits::DEFAULT_EXEC_PATH;

/// Environment variable naming the durable store file
pub const ENV_STORAGE_PATH: &str = "VFS_STORAGE_PATH";

/// Environment variable holding the colon-separated executable path
pub const ENV_EXEC_PATH: &str = "VFS_EXEC_PATH";

/// Environment variable switching tracing output to JSON
pub const ENV_TRACE_JSON: &str = "VFS_TRACE_JSON";

/// Kernel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Durable store file; `None` keeps the root tree in memory
    pub storage_path: Option<PathBuf>,

    /// Directories searched for executables, in order
    pub exec_path: Vec<String>,

    /// Emit tracing output as JSON
    pub trace_json: bool,
}

impl KernelConfig {
    /// Create default configuration (volatile root, `/bin` on the executable path)
    pub fn new() -> Self {
        Self {
            storage_path: None,
            exec_path: split_exec_path(DEFAULT_EXEC_PATH),
            trace_json: false,
        }
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(path) = lookup(ENV_STORAGE_PATH).filter(|p| !p.is_empty()) {
            config.storage_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup(ENV_EXEC_PATH) {
            config.exec_path = split_exec_path(&path);
        }

        config.trace_json = lookup(ENV_TRACE_JSON)
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);

        config
    }

    /// Use a durable store file for the root tree
    pub fn with_storage_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Replace the executable search path
    pub fn with_exec_path<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exec_path = dirs.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn split_exec_path(value: &str) -> Vec<String> {
    value
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(str::to_string)
        .collect()
}
