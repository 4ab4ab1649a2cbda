/*!
 * Syscall Tests
 * Scripts exercising each operation through the worker/controller channel
 */

use pretty_assertions::assert_eq;

use super::common::Kernel;
use vfs_kernel::ProcessState;

#[tokio::test(flavor = "multi_thread")]
async fn test_open_write_read_close() {
    let kernel = Kernel::boot().await;
    kernel.create("/home/notes.txt", "").await;
    kernel
        .install(
            "notes",
            r#"
            fn main() {
                let fd = open("notes.txt");
                write(fd, "hello");
                let back = read(fd);
                close(fd);
                exit(back);
            }
            "#,
        )
        .await;

    let config = kernel
        .config("/bin/notes.rhai")
        .with_cwd(vec!["home".to_string()]);
    let process = kernel.manager.spawn(config).await.unwrap();
    assert_eq!(process.wait().await, ProcessState::Exited);
    assert_eq!(kernel.stdout().await, "hello");
    assert_eq!(kernel.text("/home/notes.txt").await, "hello");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_write_to_standard_descriptors() {
    let kernel = Kernel::boot().await;
    kernel
        .install("std", r#"fn main() { write(2, "warned"); write(1, "printed"); }"#)
        .await;

    let process = kernel.manager.spawn(kernel.config("/bin/std.rhai")).await.unwrap();
    assert_eq!(process.wait().await, ProcessState::Exited);
    assert_eq!(kernel.stdout().await, "printed");
    assert_eq!(kernel.stderr().await, "warned");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_descriptor_is_system_error() {
    let kernel = Kernel::boot().await;
    kernel
        .install("bad", r#"fn main() { read(99); exit("unreachable"); }"#)
        .await;

    let process = kernel.manager.spawn(kernel.config("/bin/bad.rhai")).await.unwrap();
    assert_eq!(process.wait().await, ProcessState::Failed);
    assert_eq!(kernel.stderr().await, "System error: Bad file descriptor: 99");
    assert_eq!(kernel.stdout().await, "");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_import_function_and_constant() {
    let kernel = Kernel::boot().await;
    kernel
        .install("lib", "const GREETING = \"hi\";\nfn answer() { 42 }")
        .await;
    kernel
        .install(
            "importer",
            r#"
            fn main() {
                let greeting = syscall("import", "/bin/lib.rhai", "GREETING");
                let answer = syscall("import", "/bin/lib.rhai", "answer");
                exit(greeting + " " + answer);
            }
            "#,
        )
        .await;

    let process = kernel
        .manager
        .spawn(kernel.config("/bin/importer.rhai"))
        .await
        .unwrap();
    assert_eq!(process.wait().await, ProcessState::Exited);
    assert_eq!(kernel.stdout().await, "hi 42");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exec_starts_child_with_args() {
    let kernel = Kernel::boot().await;
    kernel.create("/home/out.txt", "").await;
    kernel
        .install(
            "child",
            r#"fn main(argv) { let fd = open("/home/out.txt"); write(fd, argv[0]); }"#,
        )
        .await;
    kernel
        .install(
            "parent",
            r#"fn main() { let pid = exec("/bin/child.rhai", ["from parent"]); exit(`${pid}`); }"#,
        )
        .await;

    let process = kernel.manager.spawn(kernel.config("/bin/parent.rhai")).await.unwrap();
    assert_eq!(process.wait().await, ProcessState::Exited);
    kernel.settle().await;

    let child: u32 = kernel.stdout().await.parse().unwrap();
    assert_ne!(child, process.pid());
    assert_eq!(kernel.text("/home/out.txt").await, "from parent");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_child_return_value_leaves_parent_output() {
    let kernel = Kernel::boot().await;
    kernel.create("/home/ran.txt", "").await;
    kernel
        .install(
            "child",
            r#"fn main() { let fd = open("/home/ran.txt"); write(fd, "yes"); "returned" }"#,
        )
        .await;
    kernel
        .install(
            "parent",
            r#"fn main() { exec("/bin/child.rhai", []); exit("parent done"); }"#,
        )
        .await;

    let process = kernel.manager.spawn(kernel.config("/bin/parent.rhai")).await.unwrap();
    assert_eq!(process.wait().await, ProcessState::Exited);
    kernel.settle().await;

    assert_eq!(kernel.text("/home/ran.txt").await, "yes");
    assert_eq!(kernel.stdout().await, "parent done");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fork_reruns_executable() {
    let kernel = Kernel::boot().await;
    kernel.create("/home/count.txt", "0").await;
    kernel
        .install(
            "forker",
            r#"
            fn main() {
                let fd = open("/home/count.txt");
                let n = parse_int(read(fd));
                if n < 2 {
                    write(fd, `${n + 1}`);
                    fork();
                }
            }
            "#,
        )
        .await;

    let process = kernel.manager.spawn(kernel.config("/bin/forker.rhai")).await.unwrap();
    assert_eq!(process.wait().await, ProcessState::Exited);
    kernel.settle().await;

    assert_eq!(kernel.text("/home/count.txt").await, "2");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_import_is_system_error() {
    let kernel = Kernel::boot().await;
    kernel
        .install(
            "importer",
            r#"fn main() { syscall("import", "/bin/none.rhai", "x"); }"#,
        )
        .await;

    let process = kernel
        .manager
        .spawn(kernel.config("/bin/importer.rhai"))
        .await
        .unwrap();
    assert_eq!(process.wait().await, ProcessState::Failed);
    assert!(kernel.stderr().await.starts_with("System error: "));
}
