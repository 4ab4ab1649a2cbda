/*!
 * Navigator Tests
 */

use std::sync::Arc;

use super::common::layered;
use vfs_kernel::vfs::{MemoryBackend, NavPhase, Navigator, NodeExt};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_mutations_and_reads() {
    let vfs = layered(Arc::new(MemoryBackend::new())).await;
    let nav = Arc::new(Navigator::new(vfs).await.unwrap());
    nav.add_directory("work").await.unwrap();
    nav.change_directory("work").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let nav = Arc::clone(&nav);
        tasks.push(tokio::spawn(async move {
            let name = format!("f{}", i);
            nav.add_file(name.as_bytes(), &name, "text/plain").await.unwrap();
            nav.read(&name).await.unwrap()
        }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), format!("f{}", i).into_bytes());
    }

    let listed = nav.listing().iter().filter(|n| !n.is_link()).count();
    assert_eq!(listed, 16);
    assert_eq!(nav.phase(), NavPhase::Idle);
    assert_eq!(nav.current_path_string(), "/work");
}
