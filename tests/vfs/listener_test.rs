/*!
 * Change Notification Tests
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::common::layered;
use vfs_kernel::vfs::{FileEvent, MemoryBackend, Node, NodeExt, NodeRef, Vfs};

fn counter(node: &NodeRef) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&hits);
    node.add_listener(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    hits
}

#[tokio::test]
async fn test_write_fires_file_and_parent_listeners() {
    let vfs = layered(Arc::new(MemoryBackend::new())).await;
    let dir = vfs.root().add_directory("docs").await.unwrap();
    let file = dir.add_file(b"", "a.txt", "text/plain").await.unwrap();

    let dir_hits = counter(&dir);
    let file_hits = counter(&file);

    file.write(b"changed").await.unwrap();

    assert!(file_hits.load(Ordering::SeqCst) >= 1);
    assert!(dir_hits.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_removed_listener_is_silent() {
    let vfs = layered(Arc::new(MemoryBackend::new())).await;
    let file = vfs.root().add_file(b"", "a", "text/plain").await.unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&hits);
    let id = file.add_listener(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    assert!(file.remove_listener(id));

    file.write(b"x").await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_subscribers_see_every_mutation() {
    let vfs = layered(Arc::new(MemoryBackend::new())).await;
    let mut rx = vfs.subscribe();

    let file = vfs.root().add_file(b"", "a", "text/plain").await.unwrap();
    file.write(b"x").await.unwrap();
    file.rename("b").await.unwrap();
    file.delete().await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(FileEvent::Created { .. })));
    assert!(events.iter().any(|e| matches!(e, FileEvent::Modified { .. })));
    assert!(events.iter().any(|e| matches!(e, FileEvent::Renamed { .. })));
    assert!(matches!(events.last(), Some(FileEvent::Deleted { .. })));
}

/// Trees that rebuild node handles on every lookup
async fn uncached() -> Vec<(&'static str, Vfs)> {
    let plain = Vfs::builder(Arc::new(MemoryBackend::new()))
        .build()
        .await
        .unwrap();
    let mounts_only = Vfs::builder(Arc::new(MemoryBackend::new()))
        .with_mounts()
        .build()
        .await
        .unwrap();
    let links_only = Vfs::builder(Arc::new(MemoryBackend::new()))
        .with_links()
        .build()
        .await
        .unwrap();
    vec![
        ("plain", plain),
        ("mounts", mounts_only),
        ("links", links_only),
    ]
}

#[tokio::test]
async fn test_listener_survives_separate_lookups_without_cache() {
    for (label, vfs) in uncached().await {
        let docs = vfs.root().add_directory("docs").await.unwrap();
        docs.add_file(b"", "a.txt", "text/plain").await.unwrap();

        let dir_hits = counter(&vfs.get_path("/docs").await.unwrap());
        let file_hits = counter(&vfs.get_path("/docs/a.txt").await.unwrap());

        let file = vfs.get_path("/docs/a.txt").await.unwrap();
        file.write(b"changed").await.unwrap();

        assert_eq!(file_hits.load(Ordering::SeqCst), 1, "{}", label);
        assert_eq!(dir_hits.load(Ordering::SeqCst), 1, "{}", label);
    }
}

#[tokio::test]
async fn test_listener_on_mounted_tree_without_cache() {
    let vfs = Vfs::builder(Arc::new(MemoryBackend::new()))
        .with_mounts()
        .build()
        .await
        .unwrap();
    vfs.mount(&[], Arc::new(MemoryBackend::new()), "mnt")
        .await
        .unwrap();
    vfs.get_path("/mnt")
        .await
        .unwrap()
        .add_file(b"", "f", "text/plain")
        .await
        .unwrap();

    let mount_hits = counter(&vfs.get_path("/mnt").await.unwrap());
    let root_hits = counter(&vfs.root());

    vfs.get_path("/mnt/f")
        .await
        .unwrap()
        .write(b"x")
        .await
        .unwrap();

    assert_eq!(mount_hits.load(Ordering::SeqCst), 1);
    assert_eq!(root_hits.load(Ordering::SeqCst), 1);
}
