/*!
 * Syscall Dispatcher
 * Controller-side handlers for one process
 */

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::fd::FdTable;
use super::types::{text, Syscall};
use crate::core::errors::{KernelResult, ScriptError};
use crate::core::limits::{PROCESS_ERROR_PREFIX, SYSTEM_ERROR_PREFIX};
use crate::core::types::Pid;
use crate::process::manager::ProcessManager;
use crate::process::types::{ProcessConfig, ProcessState};
use crate::vfs::{NodeExt, NodeRef, VfsError};

/// What the controller does after a handler returns
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Post `[id, value]` back to the script
    Reply(Value),
    /// Tear the process down in this state
    Exit(ProcessState),
}

/// Handler state for one process
///
/// Owned by the process's controller task, so the fd table needs no lock.
/// `exit`, `error` and completion output go to the stdout and stderr the
/// process was started with, even if the script closed 1 or 2.
pub struct SyscallDispatcher {
    pid: Pid,
    cwd: Vec<String>,
    executable: String,
    args: Vec<Value>,
    stdout: NodeRef,
    stderr: NodeRef,
    fds: FdTable,
    manager: ProcessManager,
}

impl SyscallDispatcher {
    pub fn new(pid: Pid, config: &ProcessConfig, manager: ProcessManager) -> Self {
        Self {
            pid,
            cwd: config.cwd.clone(),
            executable: config.executable.clone(),
            args: config.args.clone(),
            stdout: Arc::clone(&config.stdout),
            stderr: Arc::clone(&config.stderr),
            fds: FdTable::new(Arc::clone(&config.stdout), Arc::clone(&config.stderr)),
            manager,
        }
    }

    pub async fn dispatch(&mut self, call: Syscall) -> KernelResult<Dispatch> {
        debug!(pid = self.pid, syscall = call.name(), "Dispatching syscall");
        match call {
            Syscall::Open { path } => {
                let node = self.manager.vfs().resolve(&self.cwd, &path).await?;
                Ok(Dispatch::Reply(json!(self.fds.open(node))))
            }
            Syscall::Close { fd } => {
                self.fds.close(fd)?;
                Ok(Dispatch::Reply(Value::Null))
            }
            Syscall::Read { fd } => {
                let bytes = self.fds.get(fd)?.read_all().await?;
                Ok(Dispatch::Reply(json!(String::from_utf8_lossy(&bytes))))
            }
            Syscall::Write { fd, data } => {
                let stored = self.fds.get(fd)?.write(data.as_bytes()).await?;
                Ok(Dispatch::Reply(json!(String::from_utf8_lossy(&stored))))
            }
            Syscall::Import { path, name } => self.import(&path, &name).await.map(Dispatch::Reply),
            Syscall::Fork => {
                let config = self.child_config(self.executable.clone(), self.args.clone());
                let child = self.manager.spawn(config).await?;
                Ok(Dispatch::Reply(json!(child.pid())))
            }
            Syscall::Exec { path, args } => {
                let config = self.child_config(path, args);
                let child = self.manager.spawn(config).await?;
                Ok(Dispatch::Reply(json!(child.pid())))
            }
            Syscall::Exit { message } => {
                self.stdout.write(text(&message).as_bytes()).await?;
                Ok(Dispatch::Exit(ProcessState::Exited))
            }
            Syscall::Error { message } => {
                self.report_error(&text(&message)).await?;
                Ok(Dispatch::Exit(ProcessState::Failed))
            }
        }
    }

    async fn import(&self, path: &str, name: &str) -> KernelResult<Value> {
        let node = self.manager.vfs().resolve(&self.cwd, path).await?;
        let source = String::from_utf8(node.read_all().await?)
            .map_err(|_| VfsError::Storage(format!("{} is not UTF-8", path)))?;

        let engine = self.manager.engine();
        let name = name.to_string();
        let value = tokio::task::spawn_blocking(move || engine.evaluate_export(&source, &name))
            .await
            .map_err(|e| ScriptError::Runtime(e.to_string()))??;
        Ok(value)
    }

    fn child_config(&self, executable: String, args: Vec<Value>) -> ProcessConfig {
        ProcessConfig {
            parent: Some(self.pid),
            cwd: self.cwd.clone(),
            executable,
            args,
            stdout: Arc::clone(&self.stdout),
            stderr: Arc::clone(&self.stderr),
        }
    }

    /// Write `Error: message` to stderr
    pub async fn report_error(&self, message: &str) -> KernelResult<()> {
        let line = format!("{}{}", PROCESS_ERROR_PREFIX, message);
        self.stderr.write(line.as_bytes()).await?;
        Ok(())
    }

    /// Write `System error: ...` to stderr; failures are only logged
    pub async fn report_system_error(&self, error: String) {
        let message = format!("{}{}", SYSTEM_ERROR_PREFIX, error);
        if let Err(e) = self.stderr.write(message.as_bytes()).await {
            warn!(pid = self.pid, error = %e, "Could not write system error to stderr");
        }
    }
}
