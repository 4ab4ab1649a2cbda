/*!
 * Node Records
 * Metadata describing one file or directory, and the directory wire format
 */

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::OffsetDateTime;

use super::errors::VfsResult;
use crate::core::limits::{DIRECTORY_MIME_TYPE, LINK_MIME_TYPE};

/// Metadata record for one node
///
/// This is both the in-memory snapshot every node carries and the element
/// of the directory wire format: a directory's raw content is a JSON object
/// mapping child name to its record. Timestamps travel as ISO-8601.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// Stable within the owning backend across rename and move
    pub id: String,
    pub name: String,
    pub directory: bool,
    /// Locator for the raw bytes; may be synthesized by the backend
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub mime_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl NodeRecord {
    /// New file record stamped with the current time
    pub fn file(id: impl Into<String>, name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            name: name.into(),
            directory: false,
            url: String::new(),
            icon: None,
            size,
            mime_type: mime_type.into(),
            last_modified: now,
            created: now,
            extra: Map::new(),
        }
    }

    /// New directory record stamped with the current time
    pub fn directory(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut record = Self::file(id, name, DIRECTORY_MIME_TYPE, 0);
        record.directory = true;
        record
    }

    /// Set the locator
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// True for synthetic reference links
    #[inline]
    #[must_use]
    pub fn is_link(&self) -> bool {
        self.mime_type == LINK_MIME_TYPE
    }

    /// Bump modification time and size after a content write
    pub fn touch(&mut self, size: u64) {
        self.size = size;
        self.last_modified = OffsetDateTime::now_utc();
    }
}

/// Parsed directory content: child name → record
pub type Listing = BTreeMap<String, NodeRecord>;

/// Encode children into the directory wire format
pub fn encode_listing(children: &[NodeRecord]) -> VfsResult<Vec<u8>> {
    let listing: Listing = children
        .iter()
        .map(|record| (record.name.clone(), record.clone()))
        .collect();
    Ok(serde_json::to_vec(&listing)?)
}

/// Decode the directory wire format
pub fn decode_listing(bytes: &[u8]) -> VfsResult<Listing> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Byte-range selection applied to file content on read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadParams {
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub length: Option<u64>,
}

impl ReadParams {
    /// Read everything
    #[inline]
    pub const fn full() -> Self {
        Self {
            offset: None,
            length: None,
        }
    }

    /// Read `length` bytes starting at `offset`
    #[inline]
    pub const fn range(offset: u64, length: u64) -> Self {
        Self {
            offset: Some(offset),
            length: Some(length),
        }
    }

    /// True when no range restriction applies
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.offset.is_none() && self.length.is_none()
    }

    /// Slice content according to this selection
    pub fn apply(&self, mut data: Vec<u8>) -> Vec<u8> {
        if self.is_full() {
            return data;
        }
        let start = (self.offset.unwrap_or(0) as usize).min(data.len());
        let end = match self.length {
            Some(len) => start.saturating_add(len as usize).min(data.len()),
            None => data.len(),
        };
        data.truncate(end);
        data.drain(..start);
        data
    }
}

/// One search result: the matching record plus the records between the
/// searched directory (exclusive) and the match (exclusive)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(default)]
    pub ancestors: Vec<NodeRecord>,
    pub node: NodeRecord,
}

/// Case-insensitive name match used by every search implementation
#[inline]
pub fn name_matches(name: &str, query: &str) -> bool {
    name.to_lowercase().contains(&query.to_lowercase())
}
