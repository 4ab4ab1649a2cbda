/*!
 * Path Resolution Tests
 */

use std::sync::Arc;

use super::common::layered;
use vfs_kernel::vfs::{MemoryBackend, Node, NodeExt, Vfs, VfsError};

fn segs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_missing_directory_is_not_found() {
    let vfs = layered(Arc::new(MemoryBackend::new())).await;
    let err = vfs.get_file(&segs(&["no-such-dir", "x"])).await.unwrap_err();
    assert!(matches!(err, VfsError::NotFound(_)));

    let bare = Vfs::builder(Arc::new(MemoryBackend::new())).build().await.unwrap();
    assert!(bare.get_path("/no-such-dir/x").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_relative_resolution() {
    let vfs = layered(Arc::new(MemoryBackend::new())).await;
    let home = vfs.root().add_directory("home").await.unwrap();
    let amy = home.add_directory("amy").await.unwrap();
    amy.add_file(b"hi", "notes.txt", "text/plain").await.unwrap();

    let cwd = segs(&["home", "amy"]);
    let notes = vfs.resolve(&cwd, "notes.txt").await.unwrap();
    assert_eq!(notes.read_all().await.unwrap(), b"hi");

    let again = vfs.resolve(&cwd, "../amy/./notes.txt").await.unwrap();
    assert_eq!(again.path_string(), "/home/amy/notes.txt");

    let root = vfs.resolve(&cwd, "/").await.unwrap();
    assert!(root.parent().is_none());
}
