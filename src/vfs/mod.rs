/*!
 * Virtual File System Module
 * Node tree over pluggable storage backends
 *
 * Layers, innermost first: backend nodes, mount overlay, proxy cache,
 * reference links. `Vfs::builder` picks which ones wrap the root.
 */

pub mod executable;
pub mod fs;
pub mod http;
pub mod init;
pub mod links;
pub mod memory;
pub mod mount;
pub mod navigator;
pub mod node;
pub mod observable;
pub mod paths;
pub mod proxy;
pub mod sqlite;
pub mod traits;
pub mod types;
pub mod webdav;

// Re-exports
pub use executable::ExecutableResolver;
pub use fs::{Vfs, VfsBuilder};
pub use http::HttpBackend;
pub use init::init_vfs;
pub use memory::MemoryBackend;
pub use mount::{MountEntry, MountTable};
pub use navigator::{NavPhase, Navigator};
pub use observable::{EventBroadcaster, FileEvent, ListenerId, ListenerTable, Listeners};
pub use sqlite::SqliteBackend;
pub use traits::{Node, NodeExt, NodeKey, NodeRef, StorageBackend};
pub use types::{NodeRecord, ReadParams, SearchHit, VfsError, VfsResult};
pub use webdav::WebDavBackend;
