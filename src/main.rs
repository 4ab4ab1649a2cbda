/*!
 * VFS Kernel - Main Entry Point
 *
 * Boots the standard tree and runs one command as a process:
 *
 *   vfs-kernel <command> [args...]
 *
 * The command is looked up on the executable path, its stdout and stderr
 * go to files under /tmp, and both are printed once it exits.
 */

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use vfs_kernel::vfs::paths::mounts;
use vfs_kernel::{
    init_tracing, init_vfs, ExecutableResolver, KernelConfig, NodeExt, ProcessConfig,
    ProcessManager, ProcessRegistry, ProcessState, RhaiEngine,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = KernelConfig::from_env();
    init_tracing(config.trace_json);

    let mut argv = std::env::args().skip(1);
    let Some(command) = argv.next() else {
        bail!("usage: vfs-kernel <command> [args...]");
    };
    let args: Vec<Value> = argv.map(Value::String).collect();

    info!("VFS kernel starting...");
    let registry = Arc::new(ProcessRegistry::new());
    let vfs = init_vfs(&config, Arc::clone(&registry))
        .await
        .context("failed to initialize filesystem")?;
    let engine = Arc::new(RhaiEngine::new());
    let manager = ProcessManager::new(vfs.clone(), engine.clone(), registry);
    let resolver = ExecutableResolver::new(vfs.clone(), engine, config.exec_path.clone());

    let executable = resolver.locate(&[], &command).await?;
    let tmp = vfs.get_path(mounts::TMP).await?;
    let stdout = tmp.add_file(b"", &format!("{}.out", command), "text/plain").await?;
    let stderr = tmp.add_file(b"", &format!("{}.err", command), "text/plain").await?;

    let process = manager
        .spawn(ProcessConfig::new(executable, Arc::clone(&stdout), Arc::clone(&stderr)).with_args(args))
        .await
        .with_context(|| format!("failed to start {}", command))?;
    let state = process.wait().await;
    info!(pid = process.pid(), state = ?state, "Process finished");

    print!("{}", String::from_utf8_lossy(&stdout.read_all().await?));
    eprint!("{}", String::from_utf8_lossy(&stderr.read_all().await?));

    if state != ProcessState::Exited {
        std::process::exit(1);
    }
    Ok(())
}
