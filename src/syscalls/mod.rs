/*!
 * Syscalls Module
 * Wire protocol and controller-side handlers for process syscalls
 */

pub mod dispatcher;
pub mod fd;
pub mod types;

// Re-export public API
pub use dispatcher::{Dispatch, SyscallDispatcher};
pub use fd::FdTable;
pub use types::{ops, Syscall, SyscallRequest, SyscallResponse};
