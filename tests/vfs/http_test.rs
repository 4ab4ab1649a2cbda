/*!
 * REST Backend Tests
 * HttpBackend against a local stub API
 */

use pretty_assertions::assert_eq;

use super::stub::{Reply, StubServer};
use vfs_kernel::vfs::{HttpBackend, NodeRecord, SearchHit, StorageBackend, VfsError};

fn file(id: &str, name: &str, size: u64) -> NodeRecord {
    NodeRecord::file(id, name, "text/plain", size)
}

async fn api() -> (StubServer, HttpBackend) {
    let server = StubServer::start(|req| {
        match (req.method.as_str(), req.path.as_str()) {
            ("GET", "/api/nodes/root") => Reply::json(&NodeRecord::directory("root", "")),
            ("GET", "/api/nodes/root/children") => Reply::json(&vec![file("f1", "a.txt", 5)]),
            ("POST", "/api/nodes/root/children") => {
                let body = req.json();
                if body["directory"] == true {
                    Reply::json(&NodeRecord::directory("d1", body["name"].as_str().unwrap()))
                } else {
                    Reply::json(&file("f2", body["name"].as_str().unwrap(), 2))
                }
            }
            ("GET", "/api/nodes/f1/content") => Reply::bytes(b"hello"),
            ("PUT", "/api/nodes/f1/content") => Reply::status(204),
            ("PATCH", "/api/nodes/f1") => Reply::json(&file("f1", "c.txt", 5)),
            ("DELETE", "/api/nodes/f1") => Reply::status(204),
            ("POST", "/api/nodes/f1/copy") => Reply::json(&file("f3", "a.txt", 5)),
            ("POST", "/api/nodes/f1/move") => Reply::json(&file("f1", "a.txt", 5)),
            ("GET", "/api/nodes/root/search") => Reply::json(&vec![SearchHit {
                ancestors: Vec::new(),
                node: file("f1", "a.txt", 5),
            }]),

            // Failures
            ("GET", "/api/nodes/missing") => Reply::status(404),
            ("POST", "/api/nodes/full/children") => Reply::status(409),
            ("PATCH", "/api/nodes/locked") => Reply::status(412),
            ("DELETE", "/api/nodes/pinned") => Reply::status(405),
            ("POST", "/api/nodes/pinned/move") => Reply::status(501),
            ("GET", "/api/nodes/broken/content") => Reply::status(500),
            _ => Reply::status(404),
        }
    })
    .await;
    let backend = HttpBackend::new(&server.url("/api/")).unwrap();
    (server, backend)
}

#[tokio::test]
async fn test_reads_records_and_content() {
    let (_server, backend) = api().await;

    let root = backend.root().await.unwrap();
    assert!(root.directory);
    assert_eq!(root.id, "root");

    let children = backend.children("root").await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "a.txt");

    assert_eq!(backend.read_content("f1").await.unwrap(), b"hello");
}

#[tokio::test]
async fn test_mutations_send_expected_requests() {
    let (server, backend) = api().await;

    let created = backend
        .add_file("root", b"hi", "b.txt", "text/plain")
        .await
        .unwrap();
    assert_eq!(created.id, "f2");
    let dir = backend.add_directory("root", "sub").await.unwrap();
    assert!(dir.directory);
    assert_eq!(dir.name, "sub");

    let posts = server.requests_with("POST");
    let body = posts[0].json();
    assert_eq!(body["name"], "b.txt");
    assert_eq!(body["directory"], false);
    assert_eq!(body["mimeType"], "text/plain");
    assert_eq!(body["content"], "aGk=");
    let body = posts[1].json();
    assert_eq!(body["directory"], true);
    assert!(body.get("content").is_none());

    assert_eq!(backend.write("f1", b"new").await.unwrap(), b"new");
    assert_eq!(server.requests_with("PUT")[0].body, b"new");

    let renamed = backend.rename("f1", "c.txt").await.unwrap();
    assert_eq!(renamed.name, "c.txt");
    assert_eq!(server.requests_with("PATCH")[0].json()["name"], "c.txt");

    assert_eq!(backend.copy("f1", "d1").await.unwrap().id, "f3");
    assert_eq!(backend.move_node("f1", "d1").await.unwrap().id, "f1");
    let targets: Vec<_> = server
        .requests_with("POST")
        .iter()
        .filter(|r| r.path.ends_with("/copy") || r.path.ends_with("/move"))
        .map(|r| r.json()["target"].clone())
        .collect();
    assert_eq!(targets, vec!["d1", "d1"]);

    backend.delete("f1").await.unwrap();
    assert_eq!(server.requests_with("DELETE").len(), 1);
}

#[tokio::test]
async fn test_search_passes_query() {
    let (server, backend) = api().await;

    let hits = backend.search("root", "a b").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].node.id, "f1");

    let search = server
        .requests()
        .into_iter()
        .find(|r| r.path.ends_with("/search"))
        .unwrap();
    assert_eq!(search.query.as_deref(), Some("q=a+b"));
}

#[tokio::test]
async fn test_status_codes_map_to_error_kinds() {
    let (_server, backend) = api().await;

    let err = backend.stat("missing").await.unwrap_err();
    assert!(matches!(err, VfsError::NotFound(_)), "{:?}", err);

    let err = backend.add_directory("full", "d").await.unwrap_err();
    assert!(matches!(err, VfsError::AlreadyExists(_)), "{:?}", err);

    let err = backend.rename("locked", "x").await.unwrap_err();
    assert!(matches!(err, VfsError::AlreadyExists(_)), "{:?}", err);

    let err = backend.delete("pinned").await.unwrap_err();
    assert!(matches!(err, VfsError::NotSupported(_)), "{:?}", err);

    let err = backend.move_node("pinned", "root").await.unwrap_err();
    assert!(matches!(err, VfsError::NotSupported(_)), "{:?}", err);

    let err = backend.read_content("broken").await.unwrap_err();
    assert!(matches!(err, VfsError::Storage(_)), "{:?}", err);
}

#[tokio::test]
async fn test_unreachable_server_is_an_error() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpBackend::new(&format!("http://{}/api/", addr)).unwrap();
    assert!(backend.root().await.is_err());
}
