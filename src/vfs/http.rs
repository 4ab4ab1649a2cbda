/*!
 * HTTP Filesystem Backend
 * Remote tree exposed through a JSON REST API
 *
 * Routes, relative to the base URL:
 *   GET    nodes/{id}                  -> record
 *   GET    nodes/{id}/children         -> [record]
 *   POST   nodes/{id}/children         {name, directory, mimeType, content} -> record
 *   GET    nodes/{id}/content          -> raw bytes
 *   PUT    nodes/{id}/content          raw bytes
 *   PATCH  nodes/{id}                  {name} -> record
 *   DELETE nodes/{id}
 *   POST   nodes/{id}/copy             {target} -> record
 *   POST   nodes/{id}/move             {target} -> record
 *   GET    nodes/{id}/search?q=        -> [{ancestors, node}]
 *
 * 404 maps to `NotFound`, 409/412 to `AlreadyExists`, 405/501 to
 * `NotSupported`, anything else unsuccessful to `Storage`.
 */

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::observable::ListenerTable;
use super::traits::StorageBackend;
use super::types::*;
use crate::core::id::next_backend_id;
use crate::core::limits::REMOTE_REQUEST_TIMEOUT_SECS;
use crate::core::types::BackendId;

/// Id the server assigns to its root directory
pub const ROOT_ID: &str = "root";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    name: &'a str,
    directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    /// Base64 file content
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct RenameRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct TargetRequest<'a> {
    target: &'a str,
}

/// REST-backed filesystem
#[derive(Debug, Clone)]
pub struct HttpBackend {
    id: BackendId,
    listeners: Arc<ListenerTable>,
    base: Url,
    client: Client,
}

impl HttpBackend {
    /// Connect to an API rooted at `base_url`
    pub fn new(base_url: &str) -> VfsResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| VfsError::InvalidPath(format!("bad base URL {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(VfsError::InvalidPath(format!("{} cannot be a base URL", base_url)));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REMOTE_REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("vfs-kernel/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!(base = %base, "HTTP backend configured");
        Ok(Self {
            id: next_backend_id(),
            listeners: Arc::new(ListenerTable::new()),
            base,
            client,
        })
    }

    /// `{base}/nodes/{id}/{tail...}` with every segment escaped
    fn endpoint(&self, id: &str, tail: &[&str]) -> VfsResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| VfsError::InvalidPath(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .push("nodes")
            .push(id)
            .extend(tail);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> VfsResult<T> {
        debug!(url = %url, "GET");
        let resp = check(self.client.get(url).send().await?)?;
        Ok(resp.json().await?)
    }
}

/// Map unsuccessful statuses onto the filesystem error kinds
fn check(resp: Response) -> VfsResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let context = format!("{} returned HTTP {}", resp.url(), status.as_u16());
    Err(match status {
        StatusCode::NOT_FOUND => VfsError::NotFound(context),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => VfsError::AlreadyExists(context),
        StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
            VfsError::NotSupported(context)
        }
        _ => VfsError::Storage(context),
    })
}

#[async_trait]
impl StorageBackend for HttpBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn kind(&self) -> &str {
        "http"
    }

    fn listener_table(&self) -> &ListenerTable {
        &self.listeners
    }

    async fn root(&self) -> VfsResult<NodeRecord> {
        self.stat(ROOT_ID).await
    }

    async fn stat(&self, id: &str) -> VfsResult<NodeRecord> {
        self.get_json(self.endpoint(id, &[])?).await
    }

    async fn children(&self, id: &str) -> VfsResult<Vec<NodeRecord>> {
        self.get_json(self.endpoint(id, &["children"])?).await
    }

    async fn read_content(&self, id: &str) -> VfsResult<Vec<u8>> {
        let resp = check(self.client.get(self.endpoint(id, &["content"])?).send().await?)?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn write(&self, id: &str, data: &[u8]) -> VfsResult<Vec<u8>> {
        check(
            self.client
                .put(self.endpoint(id, &["content"])?)
                .body(data.to_vec())
                .send()
                .await?,
        )?;
        Ok(data.to_vec())
    }

    async fn add_file(
        &self,
        parent: &str,
        data: &[u8],
        name: &str,
        mime_type: &str,
    ) -> VfsResult<NodeRecord> {
        let body = CreateRequest {
            name,
            directory: false,
            mime_type: Some(mime_type),
            content: Some(STANDARD.encode(data)),
        };
        let resp = check(
            self.client
                .post(self.endpoint(parent, &["children"])?)
                .json(&body)
                .send()
                .await?,
        )?;
        Ok(resp.json().await?)
    }

    async fn add_directory(&self, parent: &str, name: &str) -> VfsResult<NodeRecord> {
        let body = CreateRequest {
            name,
            directory: true,
            mime_type: None,
            content: None,
        };
        let resp = check(
            self.client
                .post(self.endpoint(parent, &["children"])?)
                .json(&body)
                .send()
                .await?,
        )?;
        Ok(resp.json().await?)
    }

    async fn rename(&self, id: &str, new_name: &str) -> VfsResult<NodeRecord> {
        let resp = check(
            self.client
                .patch(self.endpoint(id, &[])?)
                .json(&RenameRequest { name: new_name })
                .send()
                .await?,
        )?;
        Ok(resp.json().await?)
    }

    async fn delete(&self, id: &str) -> VfsResult<()> {
        check(self.client.delete(self.endpoint(id, &[])?).send().await?)?;
        Ok(())
    }

    async fn copy(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord> {
        let resp = check(
            self.client
                .post(self.endpoint(id, &["copy"])?)
                .json(&TargetRequest {
                    target: target_parent,
                })
                .send()
                .await?,
        )?;
        Ok(resp.json().await?)
    }

    async fn move_node(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord> {
        let resp = check(
            self.client
                .post(self.endpoint(id, &["move"])?)
                .json(&TargetRequest {
                    target: target_parent,
                })
                .send()
                .await?,
        )?;
        Ok(resp.json().await?)
    }

    async fn search(&self, id: &str, query: &str) -> VfsResult<Vec<SearchHit>> {
        let mut url = self.endpoint(id, &["search"])?;
        url.query_pairs_mut().append_pair("q", query);
        self.get_json(url).await
    }
}
