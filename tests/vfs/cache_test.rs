/*!
 * Proxy Cache Coherence Tests
 */

use std::sync::Arc;

use super::common::{layered, names};
use vfs_kernel::vfs::node::BackendNode;
use vfs_kernel::vfs::{MemoryBackend, Node, NodeExt, Vfs};

#[tokio::test]
async fn test_add_through_proxy_is_listed() {
    let vfs = Vfs::builder(Arc::new(MemoryBackend::new()))
        .with_cache()
        .build()
        .await
        .unwrap();
    let root = vfs.root();

    assert!(names(&root).await.is_empty());
    root.add_file(b"new", "fresh.txt", "text/plain").await.unwrap();
    assert_eq!(names(&root).await, vec!["fresh.txt"]);
    assert!(vfs.cached_nodes() >= 2);
}

#[tokio::test]
async fn test_nested_mutation_refreshes_ancestors() {
    let vfs = layered(Arc::new(MemoryBackend::new())).await;
    let a = vfs.root().add_directory("a").await.unwrap();
    let b = a.add_directory("b").await.unwrap();
    names(&vfs.root()).await;
    names(&a).await;

    let file = b.add_file(b"", "deep", "text/plain").await.unwrap();
    file.rename("deeper").await.unwrap();

    let again = vfs.get_path("/a/b").await.unwrap();
    assert_eq!(names(&again).await, vec!["deeper"]);
}

#[tokio::test]
async fn test_bypassing_writes_are_stale_until_invalidated() {
    let backend = Arc::new(MemoryBackend::new());
    let vfs = Vfs::builder(backend.clone()).with_cache().build().await.unwrap();
    let root = vfs.root();
    assert!(names(&root).await.is_empty());

    // Mutation that does not pass through the cache layer
    let raw = BackendNode::root(backend).await.unwrap();
    raw.add_file(b"", "side", "text/plain").await.unwrap();
    assert!(names(&root).await.is_empty());

    root.invalidate();
    assert_eq!(names(&root).await, vec!["side"]);
}
