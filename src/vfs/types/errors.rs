/*!
 * VFS Error Types
 * Structured, type-safe error handling for filesystem operations
 */

use miette::Diagnostic;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// VFS operation result
///
/// # Must Use
/// VFS operations can fail and must be handled to prevent data loss
#[must_use = "VFS operations can fail and must be handled"]
pub type VfsResult<T> = Result<T, VfsError>;

/// VFS errors with structured, type-safe error handling
///
/// All error variants carry a non-empty context string.
/// Serialization uses tagged enum pattern for type safety.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum VfsError {
    /// Missing node or path segment, or descent through a non-directory
    #[error("File not found: {0}")]
    #[diagnostic(code(vfs::not_found))]
    NotFound(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    /// Name collision inside one directory
    #[error("File already exists: {0}")]
    #[diagnostic(
        code(vfs::already_exists),
        help("Names are unique within a directory. Rename or delete the existing entry first.")
    )]
    AlreadyExists(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    /// Structurally disallowed operation
    #[error("Operation not supported: {0}")]
    #[diagnostic(code(vfs::not_supported))]
    NotSupported(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    /// Move between two distinct backend instances
    #[error("Cross-backend operation: {0}")]
    #[diagnostic(
        code(vfs::cross_backend),
        help("Moves only work inside one backend. Copy the node and delete the source instead.")
    )]
    CrossBackend(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    /// Malformed path or node name
    #[error("Invalid path: {0}")]
    #[diagnostic(code(vfs::invalid_path))]
    InvalidPath(#[serde(deserialize_with = "deserialize_nonempty_string")] String),

    /// Generic backend I/O failure
    #[error("Storage error: {0}")]
    #[diagnostic(code(vfs::storage))]
    Storage(#[serde(deserialize_with = "deserialize_nonempty_string")] String),
}

impl VfsError {
    #[inline]
    pub fn not_found(context: impl Into<String>) -> Self {
        Self::NotFound(context.into())
    }

    #[inline]
    pub fn already_exists(context: impl Into<String>) -> Self {
        Self::AlreadyExists(context.into())
    }

    #[inline]
    pub fn not_supported(context: impl Into<String>) -> Self {
        Self::NotSupported(context.into())
    }

    #[inline]
    pub fn storage(context: impl Into<String>) -> Self {
        Self::Storage(context.into())
    }

    /// True for missing nodes and path segments
    #[inline]
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for VfsError {
    fn from(err: serde_json::Error) -> Self {
        VfsError::Storage(format!("malformed JSON: {}", err))
    }
}

impl From<rusqlite::Error> for VfsError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                VfsError::AlreadyExists(
                    message
                        .clone()
                        .unwrap_or_else(|| "name already taken in directory".to_string()),
                )
            }
            rusqlite::Error::QueryReturnedNoRows => VfsError::NotFound("no such row".into()),
            _ => VfsError::Storage(format!("sqlite: {}", err)),
        }
    }
}

impl From<reqwest::Error> for VfsError {
    fn from(err: reqwest::Error) -> Self {
        match err.status().map(|status| status.as_u16()) {
            Some(404) => VfsError::NotFound(err.to_string()),
            Some(409) | Some(412) => VfsError::AlreadyExists(err.to_string()),
            _ => VfsError::Storage(format!("http: {}", err)),
        }
    }
}

impl From<quick_xml::Error> for VfsError {
    fn from(err: quick_xml::Error) -> Self {
        VfsError::Storage(format!("malformed XML: {}", err))
    }
}

/// Deserialize and validate non-empty string for error messages
pub(super) fn deserialize_nonempty_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        return Err(serde::de::Error::custom("error message must not be empty"));
    }
    Ok(s)
}
