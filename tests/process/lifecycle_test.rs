/*!
 * Process Lifecycle Tests
 * Spawn, teardown and the process pseudo-directory
 */

use pretty_assertions::assert_eq;

use super::common::Kernel;
use vfs_kernel::process::ProcessInfo;
use vfs_kernel::vfs::{Node, NodeExt};
use vfs_kernel::ProcessState;

#[tokio::test(flavor = "multi_thread")]
async fn test_exit_writes_stdout_and_leaves_registry() {
    let kernel = Kernel::boot().await;
    kernel.install("done", r#"fn main() { exit("done"); }"#).await;

    let process = kernel.manager.spawn(kernel.config("/bin/done.rhai")).await.unwrap();
    let pid = process.pid();

    assert_eq!(process.wait().await, ProcessState::Exited);
    assert_eq!(kernel.stdout().await, "done");
    assert!(!kernel.registry.contains(pid));
    assert!(kernel.vfs.get_path(&format!("/proc/{}", pid)).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_is_formatted_on_stderr() {
    let kernel = Kernel::boot().await;
    kernel.install("fail", r#"fn main() { error("disk full"); }"#).await;

    let process = kernel.manager.spawn(kernel.config("/bin/fail.rhai")).await.unwrap();
    assert_eq!(process.wait().await, ProcessState::Failed);
    assert_eq!(kernel.stderr().await, "Error: disk full");
    assert_eq!(kernel.stdout().await, "");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_return_without_exit_writes_nothing() {
    let kernel = Kernel::boot().await;
    kernel.install("sum", "fn main(argv) { argv[0] + argv[1] }").await;

    let config = kernel
        .config("/bin/sum.rhai")
        .with_args(vec![serde_json::json!(2), serde_json::json!(40)]);
    let process = kernel.manager.spawn(config).await.unwrap();
    assert_eq!(process.wait().await, ProcessState::Exited);
    assert_eq!(kernel.stdout().await, "");
    assert_eq!(kernel.stderr().await, "");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_running_process_is_listed_until_killed() {
    let kernel = Kernel::boot().await;
    kernel.install("spin", "fn main() { loop { } }").await;

    let process = kernel.manager.spawn(kernel.config("/bin/spin.rhai")).await.unwrap();
    let pid = process.pid();

    let listed: Vec<String> = kernel
        .vfs
        .get_path("/proc")
        .await
        .unwrap()
        .children()
        .await
        .unwrap()
        .iter()
        .filter(|node| !node.is_link())
        .map(|node| node.name())
        .collect();
    assert_eq!(listed, vec![pid.to_string()]);

    let entry = kernel.vfs.get_path(&format!("/proc/{}", pid)).await.unwrap();
    let info: ProcessInfo = serde_json::from_slice(&entry.read_all().await.unwrap()).unwrap();
    assert_eq!(info.executable, "/bin/spin.rhai");
    assert_eq!(info.state, ProcessState::Running);

    kernel.manager.kill(pid).unwrap();
    assert_eq!(process.wait().await, ProcessState::Killed);
    assert!(kernel.registry.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_relative_executable_resolves_against_cwd() {
    let kernel = Kernel::boot().await;
    kernel.install("hello", r#"fn main() { exit("hi"); }"#).await;

    let config = kernel
        .config("../bin/hello.rhai")
        .with_cwd(vec!["home".to_string()]);
    let process = kernel.manager.spawn(config).await.unwrap();
    assert_eq!(process.wait().await, ProcessState::Exited);
    assert_eq!(kernel.stdout().await, "hi");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_kill_unknown_pid() {
    let kernel = Kernel::boot().await;
    assert!(kernel.manager.kill(9999).is_err());
}
