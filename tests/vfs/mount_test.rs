/*!
 * Mount Tests
 */

use std::sync::Arc;

use super::common::{layered, names};
use vfs_kernel::vfs::node::BackendNode;
use vfs_kernel::vfs::{MemoryBackend, Node, NodeExt, NodeRef, StorageBackend};

#[tokio::test]
async fn test_mount_is_transparent() {
    let vfs = layered(Arc::new(MemoryBackend::new())).await;
    let host = vfs.root().add_directory("mnt").await.unwrap();

    let other = Arc::new(MemoryBackend::new());
    let other_root: NodeRef = Arc::new(BackendNode::root(other.clone()).await.unwrap());
    other_root.add_file(b"inside", "f.txt", "text/plain").await.unwrap();

    vfs.mount(&host.path(), other.clone(), "m").await.unwrap();

    assert_eq!(names(&host).await, vec!["m"]);
    let m = host.child("m").await.unwrap();
    assert_eq!(m.key().backend, other.id());
    assert_eq!(names(&m).await, vec!["f.txt"]);

    let f = vfs.get_path("/mnt/m/f.txt").await.unwrap();
    assert_eq!(f.read_all().await.unwrap(), b"inside");

    // The mounted backend's own root is unchanged
    let direct: Vec<String> = other_root
        .children()
        .await
        .unwrap()
        .iter()
        .map(|c| c.name())
        .collect();
    assert_eq!(direct, vec!["f.txt"]);
}

#[tokio::test]
async fn test_writes_through_mount_land_in_mounted_backend() {
    let vfs = layered(Arc::new(MemoryBackend::new())).await;
    let other = Arc::new(MemoryBackend::new());
    vfs.mount(&[], other.clone(), "tmp").await.unwrap();

    let tmp = vfs.get_path("/tmp").await.unwrap();
    tmp.add_file(b"scratch", "s", "text/plain").await.unwrap();

    let other_root = BackendNode::root(other).await.unwrap();
    let s = other_root.child("s").await.unwrap();
    assert_eq!(s.read_all().await.unwrap(), b"scratch");
}
