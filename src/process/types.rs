/*!
 * Process Types
 * Common types for process management
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::core::types::Pid;
use crate::vfs::NodeRef;

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// Script is executing
    Running,
    /// Finished through `exit` or by returning
    Exited,
    /// Finished through `error`, a script error or a failed syscall
    Failed,
    /// Stopped by `kill`
    Killed,
}

impl ProcessState {
    #[inline]
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, ProcessState::Running)
    }
}

/// Snapshot served by the process pseudo-directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub executable: String,
    pub state: ProcessState,
}

/// Everything needed to start a process
#[derive(Clone)]
pub struct ProcessConfig {
    pub parent: Option<Pid>,
    /// Working directory; relative paths resolve against it
    pub cwd: Vec<String>,
    /// Script path, relative to `cwd` unless absolute
    pub executable: String,
    pub args: Vec<Value>,
    pub stdout: NodeRef,
    pub stderr: NodeRef,
}

impl ProcessConfig {
    pub fn new(executable: impl Into<String>, stdout: NodeRef, stderr: NodeRef) -> Self {
        Self {
            parent: None,
            cwd: Vec::new(),
            executable: executable.into(),
            args: Vec::new(),
            stdout,
            stderr,
        }
    }

    pub fn with_parent(mut self, parent: Pid) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_cwd(mut self, cwd: Vec<String>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }
}

/// Messages from a script thread to its controller
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WorkerMessage {
    /// `[correlationId, opName, ...args]`
    Syscall(Value),
    /// Entry point returned
    Completed(Value),
    /// Script raised an error
    Failed(String),
}

/// Live process handle
///
/// Held by the registry while running; callers may keep their own `Arc` to
/// wait for teardown.
pub struct Process {
    pid: Pid,
    parent: Option<Pid>,
    executable: String,
    cwd: Vec<String>,
    started: OffsetDateTime,
    state: watch::Sender<ProcessState>,
    terminated: Arc<AtomicBool>,
}

impl Process {
    pub(crate) fn new(pid: Pid, config: &ProcessConfig) -> Self {
        let (state, _) = watch::channel(ProcessState::Running);
        Self {
            pid,
            parent: config.parent,
            executable: config.executable.clone(),
            cwd: config.cwd.clone(),
            started: OffsetDateTime::now_utc(),
            state,
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn cwd(&self) -> &[String] {
        &self.cwd
    }

    pub fn started(&self) -> OffsetDateTime {
        self.started
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            parent: self.parent,
            executable: self.executable.clone(),
            state: self.state(),
        }
    }

    /// Ask the script to stop at its next interpreter step
    pub fn kill(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub(crate) fn termination_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.terminated)
    }

    pub(crate) fn set_state(&self, state: ProcessState) {
        self.state.send_replace(state);
    }

    /// Resolve once the process has been torn down
    pub async fn wait(&self) -> ProcessState {
        let mut rx = self.state.subscribe();
        let result = rx.wait_for(|state| state.is_finished()).await.map(|s| *s);
        result.unwrap_or_else(|_| self.state())
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("parent", &self.parent)
            .field("executable", &self.executable)
            .field("state", &self.state())
            .finish()
    }
}
