/*!
 * Process Manager
 * Spawns script processes and runs their syscall loop
 *
 * Each process is a pair:
 * - a worker OS thread running the interpreter, which turns host calls into
 *   request frames and blocks for the matching response;
 * - a controller task that owns the fd table, awaits each handler and posts
 *   `[id, result]` back.
 *
 * The two only share bounded flume channels and the termination flag.
 */

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::registry::ProcessRegistry;
use super::types::{Process, ProcessConfig, ProcessState, WorkerMessage};
use crate::core::errors::{KernelResult, ProcessError, ProcessResult, ScriptError};
use crate::core::limits::{SCRIPT_ENTRY_POINT, SYSCALL_CHANNEL_CAPACITY};
use crate::core::types::Pid;
use crate::script::{HostError, ScriptEngine, ScriptHost};
use crate::syscalls::dispatcher::{Dispatch, SyscallDispatcher};
use crate::syscalls::types::{ops, SyscallRequest, SyscallResponse};
use crate::vfs::{NodeExt, Vfs, VfsError};

struct ManagerInner {
    vfs: Vfs,
    engine: Arc<dyn ScriptEngine>,
    registry: Arc<ProcessRegistry>,
}

/// Process manager
///
/// Cheap to clone; clones share the filesystem, engine and registry.
#[derive(Clone)]
pub struct ProcessManager {
    inner: Arc<ManagerInner>,
}

impl ProcessManager {
    pub fn new(vfs: Vfs, engine: Arc<dyn ScriptEngine>, registry: Arc<ProcessRegistry>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                vfs,
                engine,
                registry,
            }),
        }
    }

    pub fn vfs(&self) -> &Vfs {
        &self.inner.vfs
    }

    pub fn engine(&self) -> Arc<dyn ScriptEngine> {
        Arc::clone(&self.inner.engine)
    }

    pub fn registry(&self) -> Arc<ProcessRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// Load the executable and start the process
    ///
    /// Returns once the process is registered; use [`Process::wait`] for
    /// teardown.
    pub fn spawn(&self, config: ProcessConfig) -> BoxFuture<'static, KernelResult<Arc<Process>>> {
        let manager = self.clone();
        async move {
            let node = manager.vfs().resolve(&config.cwd, &config.executable).await?;
            let source = String::from_utf8(node.read_all().await?).map_err(|_| {
                VfsError::Storage(format!("{} is not UTF-8 script source", config.executable))
            })?;

            let registry = &manager.inner.registry;
            let pid = registry.allocate();
            let process = Arc::new(Process::new(pid, &config));

            let (request_tx, request_rx) = flume::bounded(SYSCALL_CHANNEL_CAPACITY);
            let (response_tx, response_rx) = flume::bounded(SYSCALL_CHANNEL_CAPACITY);

            let host = Arc::new(ProcessHost {
                requests: request_tx.clone(),
                responses: response_rx,
                next_id: AtomicU64::new(1),
                terminated: process.termination_flag(),
                finished: AtomicBool::new(false),
            });
            let engine = manager.engine();
            let args = config.args.clone();

            registry.insert(Arc::clone(&process));
            let worker = std::thread::Builder::new()
                .name(format!("proc-{}", pid))
                .spawn(move || run_worker(engine, source, args, host, request_tx));
            if let Err(e) = worker {
                registry.remove(pid);
                return Err(ProcessError::SpawnFailed(e.to_string()).into());
            }

            info!(
                pid,
                parent = ?config.parent,
                executable = %config.executable,
                "Process spawned"
            );

            let dispatcher = SyscallDispatcher::new(pid, &config, manager.clone());
            tokio::spawn(manager.clone().control(
                Arc::clone(&process),
                dispatcher,
                request_rx,
                response_tx,
            ));
            Ok(process)
        }
        .boxed()
    }

    /// Stop a running process at its next interpreter step
    pub fn kill(&self, pid: Pid) -> ProcessResult<()> {
        let process = self
            .inner
            .registry
            .get(pid)
            .ok_or(ProcessError::NotFound(pid))?;
        process.kill();
        info!(pid, "Process kill requested");
        Ok(())
    }

    async fn control(
        self,
        process: Arc<Process>,
        mut dispatcher: SyscallDispatcher,
        requests: flume::Receiver<WorkerMessage>,
        responses: flume::Sender<Value>,
    ) {
        let pid = process.pid();
        let state = loop {
            let message = match requests.recv_async().await {
                Ok(message) => message,
                // Worker gone without a final message
                Err(_) if process.is_terminated() => break ProcessState::Killed,
                Err(_) => break ProcessState::Failed,
            };

            match message {
                WorkerMessage::Syscall(frame) => {
                    let request = match SyscallRequest::decode(&frame) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!(pid, error = %e, "Malformed syscall");
                            dispatcher.report_system_error(e.to_string()).await;
                            break ProcessState::Failed;
                        }
                    };
                    match dispatcher.dispatch(request.call).await {
                        Ok(Dispatch::Reply(value)) => {
                            let response = SyscallResponse::new(request.id, value);
                            if responses.send_async(response.encode()).await.is_err() {
                                break ProcessState::Killed;
                            }
                        }
                        Ok(Dispatch::Exit(state)) => break state,
                        Err(e) => {
                            warn!(pid, error = %e, "Syscall failed, tearing process down");
                            dispatcher.report_system_error(e.to_string()).await;
                            break ProcessState::Failed;
                        }
                    }
                }
                WorkerMessage::Completed(value) => {
                    // The return value is not output; streams are written by syscalls only
                    debug!(pid, result = %value, "Entry point returned without exit");
                    break ProcessState::Exited;
                }
                WorkerMessage::Failed(message) => {
                    if let Err(e) = dispatcher.report_error(&message).await {
                        warn!(pid, error = %e, "Could not write process error");
                    }
                    break ProcessState::Failed;
                }
            }
        };

        self.teardown(&process, state);
    }

    fn teardown(&self, process: &Process, state: ProcessState) {
        // Stops the interpreter; dropping the channels releases a blocked worker
        process.kill();
        self.inner.registry.remove(process.pid());
        process.set_state(state);
        info!(pid = process.pid(), state = ?state, "Process torn down");
    }
}

/// Worker-side half of the syscall protocol
struct ProcessHost {
    requests: flume::Sender<WorkerMessage>,
    responses: flume::Receiver<Value>,
    next_id: AtomicU64,
    terminated: Arc<AtomicBool>,
    /// Set once `exit` or `error` was sent
    finished: AtomicBool,
}

impl ProcessHost {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl ScriptHost for ProcessHost {
    fn operations(&self) -> Vec<String> {
        ops::ALL.iter().map(|op| op.to_string()).collect()
    }

    fn call(&self, op: &str, args: Vec<Value>) -> Result<Value, HostError> {
        if self.is_terminated() || self.is_finished() {
            return Err(HostError::Halted);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = SyscallRequest::frame(id, op, args);
        self.requests
            .send(WorkerMessage::Syscall(frame))
            .map_err(|_| HostError::Halted)?;

        if ops::is_terminal(op) {
            self.finished.store(true, Ordering::SeqCst);
            return Err(HostError::Halted);
        }

        loop {
            let frame = self.responses.recv().map_err(|_| HostError::Halted)?;
            let response = SyscallResponse::decode(&frame)
                .map_err(|e| HostError::Failed(e.to_string()))?;
            if response.id == id {
                return Ok(response.value);
            }
            debug!(expected = id, got = response.id, "Dropping stale syscall response");
        }
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

fn run_worker(
    engine: Arc<dyn ScriptEngine>,
    source: String,
    args: Vec<Value>,
    host: Arc<ProcessHost>,
    requests: flume::Sender<WorkerMessage>,
) {
    let result = engine.run(&source, SCRIPT_ENTRY_POINT, args, host.clone());
    if host.is_finished() || host.is_terminated() {
        return;
    }

    let message = match result {
        Ok(value) => WorkerMessage::Completed(value),
        Err(ScriptError::Runtime(message)) => WorkerMessage::Failed(message),
        Err(other) => WorkerMessage::Failed(other.to_string()),
    };
    // Controller gone means the process was already torn down
    let _ = requests.send(message);
}
