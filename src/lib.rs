/*!
 * VFS Kernel Library
 * Layered virtual filesystem with a script process runtime
 */

pub mod core;
pub mod monitoring;
pub mod process;
pub mod script;
pub mod syscalls;
pub mod vfs;

// Re-exports
pub use crate::core::{KernelConfig, KernelError, KernelResult};
pub use monitoring::init_tracing;
pub use process::{Process, ProcessConfig, ProcessManager, ProcessRegistry, ProcessState};
pub use script::{RhaiEngine, ScriptEngine, ScriptHost};
pub use vfs::{
    init_vfs, ExecutableResolver, Navigator, Node, NodeExt, NodeRef, StorageBackend, Vfs,
    VfsError, VfsResult,
};
