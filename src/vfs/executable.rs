/*!
 * Executable Resolution
 * Search path lookup and direct invocation of script commands
 *
 * `exec(command, args)` tries `<dir>/<command>.rhai` for each directory on
 * the search path, in order. The first script found runs its entry point
 * with a host bound to the filesystem; a candidate that does not exist is
 * skipped and any other failure aborts the search.
 */

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info};

use super::fs::Vfs;
use super::paths;
use super::traits::{NodeExt, NodeRef};
use super::types::*;
use crate::core::errors::{KernelError, KernelResult, ScriptError};
use crate::core::limits::{DEFAULT_MIME_TYPE, SCRIPT_ENTRY_POINT, SCRIPT_SUFFIX};
use crate::script::{HostError, ScriptEngine, ScriptHost};

/// Operations a directly executed script may call
pub mod fs_ops {
    pub const READ: &str = "read";
    pub const WRITE: &str = "write";
    pub const LIST: &str = "list";
    pub const MKDIR: &str = "mkdir";

    pub const ALL: [&str; 4] = [READ, WRITE, LIST, MKDIR];
}

/// Runs commands found on a search path
#[derive(Clone)]
pub struct ExecutableResolver {
    vfs: Vfs,
    engine: Arc<dyn ScriptEngine>,
    search_path: Vec<String>,
}

impl ExecutableResolver {
    pub fn new(vfs: Vfs, engine: Arc<dyn ScriptEngine>, search_path: Vec<String>) -> Self {
        Self {
            vfs,
            engine,
            search_path,
        }
    }

    pub fn search_path(&self) -> &[String] {
        &self.search_path
    }

    /// Path of the first `<dir>/<command>.rhai` on the search path
    ///
    /// Missing candidates are skipped; any other lookup error aborts.
    pub async fn locate(&self, cwd: &[String], command: &str) -> KernelResult<String> {
        for dir in &self.search_path {
            let candidate = format!("{}/{}{}", dir.trim_end_matches('/'), command, SCRIPT_SUFFIX);
            match self.vfs.resolve(cwd, &candidate).await {
                Ok(_) => return Ok(candidate),
                Err(e) if e.is_not_found() => {
                    debug!(candidate = %candidate, "Executable candidate not found");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(VfsError::NotFound(format!("command not found: {}", command)).into())
    }

    /// Locate `command` and run it with `args`, returning its entry point's value
    pub async fn exec(&self, cwd: &[String], command: &str, args: Vec<Value>) -> KernelResult<Value> {
        let path = self.locate(cwd, command).await?;
        let script = self.load(cwd, &path).await?;

        info!(command, path = %path, "Executing command");
        self.run(cwd, script, args).await
    }

    async fn load(&self, cwd: &[String], path: &str) -> KernelResult<String> {
        let node = self.vfs.resolve(cwd, path).await?;
        let bytes = node.read_all().await?;
        String::from_utf8(bytes)
            .map_err(|_| VfsError::Storage(format!("{} is not UTF-8 script source", path)).into())
    }

    async fn run(&self, cwd: &[String], source: String, args: Vec<Value>) -> KernelResult<Value> {
        let host = Arc::new(FsHost {
            vfs: self.vfs.clone(),
            cwd: cwd.to_vec(),
            runtime: Handle::current(),
        });
        let engine = Arc::clone(&self.engine);

        let value = tokio::task::spawn_blocking(move || {
            engine.run(&source, SCRIPT_ENTRY_POINT, args, host)
        })
        .await
        .map_err(|e| KernelError::Script(ScriptError::Runtime(e.to_string())))??;
        Ok(value)
    }
}

/// Host giving a script plain file access, resolved against a working directory
struct FsHost {
    vfs: Vfs,
    cwd: Vec<String>,
    runtime: Handle,
}

impl FsHost {
    async fn write(&self, path: &str, data: &str) -> VfsResult<Value> {
        let stored = match self.vfs.resolve(&self.cwd, path).await {
            Ok(node) => node.write(data.as_bytes()).await?,
            Err(VfsError::NotFound(_)) => {
                let (parent, name) = self.parent_of(path).await?;
                parent
                    .add_file(data.as_bytes(), &name, DEFAULT_MIME_TYPE)
                    .await?
                    .read_all()
                    .await?
            }
            Err(e) => return Err(e),
        };
        Ok(json!(String::from_utf8_lossy(&stored)))
    }

    async fn parent_of(&self, path: &str) -> VfsResult<(NodeRef, String)> {
        let mut segments = paths::normalize(&paths::join(&self.cwd, path));
        let name = segments
            .pop()
            .ok_or_else(|| VfsError::InvalidPath(format!("{} names no file", path)))?;
        Ok((self.vfs.get_file(&segments).await?, name))
    }

    async fn call_async(&self, op: &str, args: &[Value]) -> VfsResult<Value> {
        let path = args.first().and_then(Value::as_str).ok_or_else(|| {
            VfsError::InvalidPath(format!("{} expects a path argument", op))
        })?;

        match op {
            fs_ops::READ => {
                let bytes = self.vfs.resolve(&self.cwd, path).await?.read_all().await?;
                Ok(json!(String::from_utf8_lossy(&bytes)))
            }
            fs_ops::WRITE => {
                let data = args.get(1).and_then(Value::as_str).unwrap_or_default();
                self.write(path, data).await
            }
            fs_ops::LIST => {
                let names: Vec<String> = self
                    .vfs
                    .resolve(&self.cwd, path)
                    .await?
                    .children()
                    .await?
                    .iter()
                    .filter(|child| !child.is_link())
                    .map(|child| child.name())
                    .collect();
                Ok(json!(names))
            }
            fs_ops::MKDIR => {
                let (parent, name) = self.parent_of(path).await?;
                let dir = parent.add_directory(&name).await?;
                Ok(json!(dir.path_string()))
            }
            other => Err(VfsError::NotSupported(format!("unknown operation {}", other))),
        }
    }
}

impl ScriptHost for FsHost {
    fn operations(&self) -> Vec<String> {
        fs_ops::ALL.iter().map(|op| op.to_string()).collect()
    }

    fn call(&self, op: &str, args: Vec<Value>) -> Result<Value, HostError> {
        self.runtime
            .block_on(self.call_async(op, &args))
            .map_err(|e| HostError::Failed(e.to_string()))
    }
}
