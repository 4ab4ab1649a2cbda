/*!
 * VFS Types
 * Shared types for filesystem operations with modern serde patterns
 */

mod errors;
mod record;

pub use errors::{VfsError, VfsResult};
pub use record::{
    decode_listing, encode_listing, name_matches, Listing, NodeRecord, ReadParams, SearchHit,
};
