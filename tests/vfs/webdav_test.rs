/*!
 * WebDAV Backend Tests
 * WebDavBackend against a small in-memory DAV server
 */

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::stub::{Reply, Request, StubServer};
use vfs_kernel::vfs::{FileEvent, NodeExt, StorageBackend, Vfs, VfsError, WebDavBackend};

#[derive(Clone)]
struct Resource {
    collection: bool,
    data: Vec<u8>,
    content_type: String,
}

/// Resources keyed by escaped path without a trailing slash
#[derive(Default)]
struct DavTree {
    resources: BTreeMap<String, Resource>,
}

fn key(path: &str) -> String {
    path.trim_end_matches('/').to_string()
}

fn parent_key(key: &str) -> String {
    match key.rfind('/') {
        Some(pos) => key[..pos].to_string(),
        None => String::new(),
    }
}

impl DavTree {
    fn new(root: &str) -> Self {
        let mut tree = Self::default();
        tree.resources.insert(
            key(root),
            Resource {
                collection: true,
                data: Vec::new(),
                content_type: String::new(),
            },
        );
        tree
    }

    fn href(key: &str, resource: &Resource) -> String {
        if resource.collection {
            format!("{}/", key)
        } else {
            key.to_string()
        }
    }

    fn response_xml(key: &str, resource: &Resource) -> String {
        let props = if resource.collection {
            "<d:resourcetype><d:collection/></d:resourcetype>".to_string()
        } else {
            format!(
                "<d:resourcetype/><d:getcontentlength>{}</d:getcontentlength>\
                 <d:getcontenttype>{}</d:getcontenttype>",
                resource.data.len(),
                resource.content_type
            )
        };
        format!(
            "<d:response><d:href>{}</d:href><d:propstat><d:prop>{}</d:prop>\
             <d:status>HTTP/1.1 200 OK</d:status></d:propstat></d:response>",
            Self::href(key, resource),
            props
        )
    }

    fn handle(&mut self, req: &Request) -> Reply {
        let target = key(&req.path);
        match req.method.as_str() {
            "PROPFIND" => {
                let Some(resource) = self.resources.get(&target) else {
                    return Reply::status(404);
                };
                let mut body = String::from(r#"<?xml version="1.0"?><d:multistatus xmlns:d="DAV:">"#);
                body.push_str(&Self::response_xml(&target, resource));
                if req.header("Depth") == Some("1") && resource.collection {
                    for (k, child) in &self.resources {
                        if parent_key(k) == target {
                            body.push_str(&Self::response_xml(k, child));
                        }
                    }
                }
                body.push_str("</d:multistatus>");
                Reply::multistatus(body)
            }
            "GET" => match self.resources.get(&target) {
                Some(resource) if !resource.collection => Reply::bytes(&resource.data),
                Some(_) => Reply::status(405),
                None => Reply::status(404),
            },
            "PUT" => {
                if !self.is_collection(&parent_key(&target)) {
                    return Reply::status(409);
                }
                if req.header("If-None-Match") == Some("*") && self.resources.contains_key(&target) {
                    return Reply::status(412);
                }
                self.resources.insert(
                    target,
                    Resource {
                        collection: false,
                        data: req.body.clone(),
                        content_type: req
                            .header("Content-Type")
                            .unwrap_or("application/octet-stream")
                            .to_string(),
                    },
                );
                Reply::status(201)
            }
            "MKCOL" => {
                if self.resources.contains_key(&target) {
                    return Reply::status(405);
                }
                if !self.is_collection(&parent_key(&target)) {
                    return Reply::status(409);
                }
                self.resources.insert(
                    target,
                    Resource {
                        collection: true,
                        data: Vec::new(),
                        content_type: String::new(),
                    },
                );
                Reply::status(201)
            }
            "DELETE" => {
                if self.subtree(&target).is_empty() {
                    return Reply::status(404);
                }
                for k in self.subtree(&target) {
                    self.resources.remove(&k);
                }
                Reply::status(204)
            }
            "MOVE" | "COPY" => {
                let Some(destination) = req.header("Destination").map(destination_key) else {
                    return Reply::status(400);
                };
                let moved = self.subtree(&target);
                if moved.is_empty() {
                    return Reply::status(404);
                }
                if self.resources.contains_key(&destination) {
                    return Reply::status(412);
                }
                if !self.is_collection(&parent_key(&destination)) {
                    return Reply::status(409);
                }
                for k in moved {
                    let resource = if req.method == "MOVE" {
                        self.resources.remove(&k)
                    } else {
                        self.resources.get(&k).cloned()
                    };
                    if let Some(resource) = resource {
                        let renamed = format!("{}{}", destination, &k[target.len()..]);
                        self.resources.insert(renamed, resource);
                    }
                }
                Reply::status(201)
            }
            _ => Reply::status(405),
        }
    }

    fn is_collection(&self, key: &str) -> bool {
        self.resources.get(key).map(|r| r.collection).unwrap_or(false)
    }

    /// `key` and everything below it
    fn subtree(&self, key: &str) -> Vec<String> {
        let prefix = format!("{}/", key);
        self.resources
            .keys()
            .filter(|k| k.as_str() == key || k.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

/// Path part of an absolute `Destination` URL
fn destination_key(url: &str) -> String {
    let path = url
        .splitn(4, '/')
        .nth(3)
        .map(|rest| format!("/{}", rest))
        .unwrap_or_default();
    key(&path)
}

async fn dav() -> (StubServer, Arc<WebDavBackend>) {
    let tree = Mutex::new(DavTree::new("/dav"));
    let server = StubServer::start(move |req| tree.lock().handle(req)).await;
    let backend = Arc::new(WebDavBackend::new(&server.url("/dav/")).unwrap());
    (server, backend)
}

async fn cached_tree(backend: Arc<WebDavBackend>) -> Vfs {
    Vfs::builder(backend).with_cache().build().await.unwrap()
}

#[tokio::test]
async fn test_tree_operations_over_webdav() {
    let (_server, backend) = dav().await;
    let vfs = cached_tree(backend).await;
    let root = vfs.root();

    let docs = root.add_directory("docs").await.unwrap();
    assert_eq!(docs.id(), "/dav/docs/");
    let file = docs
        .add_file(b"hello", "a.txt", "text/plain")
        .await
        .unwrap();
    assert_eq!(file.id(), "/dav/docs/a.txt");
    assert_eq!(file.record().mime_type, "text/plain");

    let names: Vec<String> = docs.children().await.unwrap().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["a.txt"]);
    assert_eq!(vfs.get_path("/docs/a.txt").await.unwrap().read_all().await.unwrap(), b"hello");

    file.write(b"changed").await.unwrap();
    assert_eq!(file.read_all().await.unwrap(), b"changed");

    let err = docs.add_file(b"", "a.txt", "text/plain").await.unwrap_err();
    assert!(matches!(err, VfsError::AlreadyExists(_)), "{:?}", err);
    let err = docs.add_directory("a.txt").await.unwrap_err();
    assert!(matches!(err, VfsError::AlreadyExists(_)), "{:?}", err);

    let archive = root.add_directory("archive").await.unwrap();
    let copy = file.copy_to(Arc::clone(&archive)).await.unwrap();
    assert_eq!(copy.read_all().await.unwrap(), b"changed");

    file.delete().await.unwrap();
    assert!(vfs.get_path("/docs/a.txt").await.unwrap_err().is_not_found());
    assert!(vfs.get_path("/archive/a.txt").await.is_ok());
}

#[tokio::test]
async fn test_status_codes_map_to_error_kinds() {
    let (_server, backend) = dav().await;
    let root = backend.root().await.unwrap();
    backend.add_directory(&root.id, "docs").await.unwrap();
    let file = backend
        .add_file("/dav/docs/", b"x", "a.txt", "text/plain")
        .await
        .unwrap();
    backend
        .add_file("/dav/docs/", b"y", "b.txt", "text/plain")
        .await
        .unwrap();

    // 404
    let err = backend.stat("/dav/missing").await.unwrap_err();
    assert!(matches!(err, VfsError::NotFound(_)), "{:?}", err);

    // 409: intermediate collection missing
    let err = backend.write("/dav/nowhere/a.txt", b"x").await.unwrap_err();
    assert!(matches!(err, VfsError::NotFound(_)), "{:?}", err);

    // 412: destination exists and overwrite is refused
    let err = backend.rename(&file.id, "b.txt").await.unwrap_err();
    assert!(matches!(err, VfsError::AlreadyExists(_)), "{:?}", err);

    // 405: GET on a collection
    let err = backend.read_content("/dav/docs/").await.unwrap_err();
    assert!(matches!(err, VfsError::NotSupported(_)), "{:?}", err);

    let err = backend.delete(&root.id).await.unwrap_err();
    assert!(matches!(err, VfsError::NotSupported(_)), "{:?}", err);
}

#[tokio::test]
async fn test_rename_changes_id_and_lookups_recover() {
    let (_server, backend) = dav().await;
    let vfs = cached_tree(Arc::clone(&backend)).await;

    let docs = vfs.root().add_directory("docs").await.unwrap();
    let file = docs.add_file(b"v1", "a.txt", "text/plain").await.unwrap();
    let old_id = file.id();

    let renamed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&renamed);
    docs.add_listener(move |event| {
        if let FileEvent::Renamed { to, .. } = event {
            sink.lock().push(to.clone());
        }
    });

    file.rename("b.txt").await.unwrap();
    assert_ne!(file.id(), old_id);
    assert_eq!(file.id(), "/dav/docs/b.txt");
    assert_eq!(renamed.lock().clone(), vec!["/docs/b.txt".to_string()]);

    // The handle that renamed keeps working against the new resource
    file.write(b"v2").await.unwrap();

    // Fresh lookups relist the parent and find the resource under its new id
    assert!(vfs.get_path("/docs/a.txt").await.unwrap_err().is_not_found());
    let fresh = vfs.get_path("/docs/b.txt").await.unwrap();
    assert_eq!(fresh.id(), file.id());
    assert_eq!(fresh.read_all().await.unwrap(), b"v2");
    assert!(backend.stat(&old_id).await.unwrap_err().is_not_found());
}
