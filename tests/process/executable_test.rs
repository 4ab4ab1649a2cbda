/*!
 * Executable Resolution Tests
 */

use serde_json::json;
use std::sync::Arc;

use super::common::Kernel;
use vfs_kernel::{ExecutableResolver, RhaiEngine};

#[tokio::test(flavor = "multi_thread")]
async fn test_command_runs_against_filesystem() {
    let kernel = Kernel::boot().await;
    kernel
        .install(
            "touch",
            r#"fn main(argv) { write(argv[0], "created"); list("/home") }"#,
        )
        .await;

    let resolver = ExecutableResolver::new(
        kernel.vfs.clone(),
        Arc::new(RhaiEngine::new()),
        vec!["/usr/bin".to_string(), "/bin".to_string()],
    );
    let listed = resolver
        .exec(&[], "touch", vec![json!("/home/new.txt")])
        .await
        .unwrap();

    assert_eq!(listed, json!(["new.txt"]));
    assert_eq!(kernel.text("/home/new.txt").await, "created");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_command_names_it() {
    let kernel = Kernel::boot().await;
    let resolver = ExecutableResolver::new(
        kernel.vfs.clone(),
        Arc::new(RhaiEngine::new()),
        vec!["/bin".to_string()],
    );
    let err = resolver.exec(&[], "frobnicate", vec![]).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("frobnicate"));
}
