/*!
 * WebDAV Filesystem Backend
 * Remote collection tree over PROPFIND, MKCOL, PUT, MOVE, COPY and DELETE
 *
 * Node ids are the escaped URL paths of the resources, collections ending in
 * `/`. WebDAV has no stable resource identity, so ids change on rename and
 * move. The node that performed the change adopts the new id and its
 * listener set moves with it. A caching layer keys its entries by id, so it
 * treats the renamed resource as a new child on the next listing: old
 * cached handles for the previous id are dropped and fresh lookups resolve
 * the new path.
 */

use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::{CONTENT_TYPE, IF_NONE_MATCH};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;
use tracing::{debug, info};

use super::observable::ListenerTable;
use super::paths::validate_name;
use super::traits::StorageBackend;
use super::types::*;
use crate::core::id::next_backend_id;
use crate::core::limits::{DEFAULT_MIME_TYPE, REMOTE_REQUEST_TIMEOUT_SECS};
use crate::core::types::BackendId;

/// Characters escaped inside one path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:displayname/>
    <D:getcontentlength/>
    <D:getcontenttype/>
    <D:getlastmodified/>
    <D:creationdate/>
    <D:resourcetype/>
  </D:prop>
</D:propfind>"#;

/// One `<response>` of a multistatus document
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DavEntry {
    pub href: String,
    pub display_name: Option<String>,
    pub content_length: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
    pub created: Option<String>,
    pub collection: bool,
}

#[derive(Clone, Copy)]
enum Field {
    Href,
    DisplayName,
    ContentLength,
    ContentType,
    LastModified,
    Created,
}

/// Parse a 207 multistatus body, matching elements by local name
pub fn parse_multistatus(xml: &str) -> VfsResult<Vec<DavEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<DavEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"response" => current = Some(DavEntry::default()),
                b"href" => field = Some(Field::Href),
                b"displayname" => field = Some(Field::DisplayName),
                b"getcontentlength" => field = Some(Field::ContentLength),
                b"getcontenttype" => field = Some(Field::ContentType),
                b"getlastmodified" => field = Some(Field::LastModified),
                b"creationdate" => field = Some(Field::Created),
                b"collection" => {
                    if let Some(entry) = current.as_mut() {
                        entry.collection = true;
                    }
                }
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"collection" {
                    if let Some(entry) = current.as_mut() {
                        entry.collection = true;
                    }
                }
            }
            Event::Text(t) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let text = t.unescape()?.into_owned();
                    match f {
                        // Several propstat blocks may repeat an href; keep the first
                        Field::Href if entry.href.is_empty() => entry.href = text,
                        Field::Href => {}
                        Field::DisplayName => entry.display_name = Some(text),
                        Field::ContentLength => {
                            entry.content_length = text.trim().parse().unwrap_or(0)
                        }
                        Field::ContentType => entry.content_type = Some(text),
                        Field::LastModified => entry.last_modified = Some(text),
                        Field::Created => entry.created = Some(text),
                    }
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"response" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

fn parse_time(value: Option<&str>) -> Option<OffsetDateTime> {
    let value = value?.trim();
    // HTTP dates name the zone "GMT"
    let numeric = match value.strip_suffix(" GMT") {
        Some(stem) => format!("{} +0000", stem),
        None => value.to_string(),
    };
    OffsetDateTime::parse(&numeric, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(value, &Rfc3339))
        .ok()
}

/// Last non-empty path segment, unescaped
fn last_segment(path: &str) -> String {
    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn same_path(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// WebDAV-backed filesystem
#[derive(Debug, Clone)]
pub struct WebDavBackend {
    id: BackendId,
    listeners: Arc<ListenerTable>,
    base: Url,
    client: Client,
}

impl WebDavBackend {
    /// Connect to the collection at `base_url`
    pub fn new(base_url: &str) -> VfsResult<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| VfsError::InvalidPath(format!("bad base URL {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(VfsError::InvalidPath(format!("{} cannot be a base URL", base_url)));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REMOTE_REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("vfs-kernel/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!(base = %base, "WebDAV backend configured");
        Ok(Self {
            id: next_backend_id(),
            listeners: Arc::new(ListenerTable::new()),
            base,
            client,
        })
    }

    fn url(&self, id: &str) -> VfsResult<Url> {
        self.base
            .join(id)
            .map_err(|e| VfsError::InvalidPath(format!("bad resource path {}: {}", id, e)))
    }

    /// Id of `name` inside the collection `parent`
    fn child_id(parent: &str, name: &str, directory: bool) -> String {
        let mut id = parent.to_string();
        if !id.ends_with('/') {
            id.push('/');
        }
        id.extend(utf8_percent_encode(name, SEGMENT));
        if directory {
            id.push('/');
        }
        id
    }

    /// Id of the parent collection
    fn parent_id(id: &str) -> String {
        let trimmed = id.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(pos) => trimmed[..=pos].to_string(),
            None => "/".to_string(),
        }
    }

    fn record(&self, entry: DavEntry) -> VfsResult<NodeRecord> {
        let url = self.url(&entry.href)?;
        let id = url.path().to_string();
        let name = if same_path(&id, self.base.path()) {
            String::new()
        } else {
            entry
                .display_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| last_segment(&id))
        };

        let mut record = if entry.collection {
            NodeRecord::directory(id, name)
        } else {
            NodeRecord::file(
                id,
                name,
                entry
                    .content_type
                    .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
                entry.content_length,
            )
        };
        if let Some(modified) = parse_time(entry.last_modified.as_deref()) {
            record.last_modified = modified;
        }
        if let Some(created) = parse_time(entry.created.as_deref()) {
            record.created = created;
        }
        Ok(record.with_url(url.to_string()))
    }

    fn request(&self, method: &str, id: &str) -> VfsResult<RequestBuilder> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| VfsError::Storage(format!("bad method {}: {}", method, e)))?;
        Ok(self.client.request(method, self.url(id)?))
    }

    async fn propfind(&self, id: &str, depth: &str) -> VfsResult<Vec<DavEntry>> {
        debug!(id, depth, "PROPFIND");
        let resp = check(
            self.request("PROPFIND", id)?
                .header("Depth", depth)
                .header(CONTENT_TYPE, "application/xml")
                .body(PROPFIND_BODY)
                .send()
                .await?,
        )?;
        parse_multistatus(&resp.text().await?)
    }

    /// MOVE or COPY `id` to `destination`, refusing to overwrite
    async fn transfer(&self, method: &str, id: &str, destination: &str) -> VfsResult<NodeRecord> {
        check(
            self.request(method, id)?
                .header("Destination", self.url(destination)?.as_str())
                .header("Overwrite", "F")
                .send()
                .await?,
        )?;
        self.stat(destination).await
    }

    async fn ensure_collection(&self, id: &str) -> VfsResult<()> {
        let record = self.stat(id).await?;
        if record.directory {
            Ok(())
        } else {
            Err(VfsError::NotSupported(format!("{} is not a collection", record.name)))
        }
    }
}

fn check(resp: Response) -> VfsResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let context = format!("{} returned HTTP {}", resp.url(), status.as_u16());
    Err(match status {
        StatusCode::NOT_FOUND | StatusCode::CONFLICT => VfsError::NotFound(context),
        StatusCode::PRECONDITION_FAILED => VfsError::AlreadyExists(context),
        StatusCode::METHOD_NOT_ALLOWED => VfsError::NotSupported(context),
        _ => VfsError::Storage(context),
    })
}

#[async_trait]
impl StorageBackend for WebDavBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn kind(&self) -> &str {
        "webdav"
    }

    fn listener_table(&self) -> &ListenerTable {
        &self.listeners
    }

    async fn root(&self) -> VfsResult<NodeRecord> {
        let root = self.base.path().to_string();
        self.stat(&root).await
    }

    async fn stat(&self, id: &str) -> VfsResult<NodeRecord> {
        let entry = self
            .propfind(id, "0")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| VfsError::NotFound(format!("webdav resource {}", id)))?;
        self.record(entry)
    }

    async fn children(&self, id: &str) -> VfsResult<Vec<NodeRecord>> {
        let mut records = Vec::new();
        let mut saw_self_collection = false;
        for entry in self.propfind(id, "1").await? {
            let record = self.record(entry)?;
            if same_path(&record.id, id) {
                saw_self_collection = record.directory;
                continue;
            }
            records.push(record);
        }
        if !saw_self_collection && records.is_empty() {
            // Depth 1 on a plain resource only describes the resource itself
            self.ensure_collection(id).await?;
        }
        Ok(records)
    }

    async fn read_content(&self, id: &str) -> VfsResult<Vec<u8>> {
        let resp = check(self.client.get(self.url(id)?).send().await?)?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn write(&self, id: &str, data: &[u8]) -> VfsResult<Vec<u8>> {
        check(self.client.put(self.url(id)?).body(data.to_vec()).send().await?)?;
        Ok(data.to_vec())
    }

    async fn add_file(
        &self,
        parent: &str,
        data: &[u8],
        name: &str,
        mime_type: &str,
    ) -> VfsResult<NodeRecord> {
        validate_name(name)?;
        self.ensure_collection(parent).await?;
        let id = Self::child_id(parent, name, false);
        if self.stat(&Self::child_id(parent, name, true)).await.is_ok() {
            return Err(VfsError::AlreadyExists(format!("{} in {}", name, parent)));
        }
        check(
            self.client
                .put(self.url(&id)?)
                .header(IF_NONE_MATCH, "*")
                .header(CONTENT_TYPE, mime_type)
                .body(data.to_vec())
                .send()
                .await?,
        )?;
        self.stat(&id).await
    }

    async fn add_directory(&self, parent: &str, name: &str) -> VfsResult<NodeRecord> {
        validate_name(name)?;
        self.ensure_collection(parent).await?;
        if self.stat(&Self::child_id(parent, name, false)).await.is_ok() {
            return Err(VfsError::AlreadyExists(format!("{} in {}", name, parent)));
        }
        let id = Self::child_id(parent, name, true);
        let resp = self.request("MKCOL", &id)?.send().await?;
        if resp.status() == StatusCode::METHOD_NOT_ALLOWED {
            // MKCOL on an existing resource
            return Err(VfsError::AlreadyExists(format!("{} in {}", name, parent)));
        }
        check(resp)?;
        self.stat(&id).await
    }

    async fn rename(&self, id: &str, new_name: &str) -> VfsResult<NodeRecord> {
        validate_name(new_name)?;
        let directory = id.ends_with('/');
        let destination = Self::child_id(&Self::parent_id(id), new_name, directory);
        self.transfer("MOVE", id, &destination).await
    }

    async fn delete(&self, id: &str) -> VfsResult<()> {
        if same_path(id, self.base.path()) {
            return Err(VfsError::NotSupported("cannot delete the root collection".into()));
        }
        check(self.client.delete(self.url(id)?).send().await?)?;
        Ok(())
    }

    async fn copy(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord> {
        self.ensure_collection(target_parent).await?;
        let name = last_segment(id);
        let destination = Self::child_id(target_parent, &name, id.ends_with('/'));
        self.transfer("COPY", id, &destination).await
    }

    async fn move_node(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord> {
        if same_path(id, self.base.path()) {
            return Err(VfsError::NotSupported("cannot move the root collection".into()));
        }
        if target_parent.starts_with(id) && id.ends_with('/') {
            return Err(VfsError::NotSupported(format!(
                "cannot move {} into its own subtree",
                id
            )));
        }
        self.ensure_collection(target_parent).await?;
        let name = last_segment(id);
        let destination = Self::child_id(target_parent, &name, id.ends_with('/'));
        self.transfer("MOVE", id, &destination).await
    }
}
