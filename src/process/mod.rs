/*!
 * Process Module
 * Script processes, their registry and the `/proc` view
 */

pub mod backend;
pub mod manager;
pub mod registry;
pub mod types;

// Re-export for convenience
pub use backend::ProcessBackend;
pub use manager::ProcessManager;
pub use registry::ProcessRegistry;
pub use types::{Process, ProcessConfig, ProcessInfo, ProcessState};
